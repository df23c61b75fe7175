use clap::Parser;
use log::LevelFilter;

fn main() {
    let args = zbin::cli::Args::parse();
    let level = if args.verbose {
        LevelFilter::Debug
    } else if args.quiet {
        LevelFilter::Error
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_target(false)
        .format_timestamp(None)
        .init();

    if let Err(err) = zbin::run(args) {
        eprintln!("zbin: {err:#}");
        std::process::exit(1);
    }
}
