pub mod builder;
pub mod cli;
pub mod compress;
pub mod format;
pub mod image;
pub mod interp;

pub use builder::{build_image, run};
