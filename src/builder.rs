use std::io::Write;

use anyhow::{Context, Result};
use log::{debug, info};

use crate::cli::Args;
use crate::compress::Nrv2b;
use crate::format::zinfo::parse_zinfo;
use crate::interp::Interpreter;

pub const DEFAULT_EXPANSION: usize = 4;

pub fn run(args: Args) -> Result<()> {
    let input = read_file(&args.input)?;
    let zinfo = read_file(&args.zinfo)?;
    let capacity = match args.capacity {
        Some(capacity) => capacity,
        None => input
            .len()
            .checked_mul(DEFAULT_EXPANSION)
            .with_context(|| format!("{} is too large", args.input))?,
    };
    debug!(
        "input {}: {:#x} bytes, zinfo {}: {:#x} bytes, capacity {:#x}",
        args.input,
        input.len(),
        args.zinfo,
        zinfo.len(),
        capacity
    );

    let output = build_image(&input, &zinfo, capacity)
        .with_context(|| format!("failed to build image from {}", args.input))?;

    match &args.output {
        Some(path) => std::fs::write(path, &output).with_context(|| format!("failed to write {path}"))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&output)
                .and_then(|()| stdout.flush())
                .with_context(|| format!("could not write {} bytes of output", output.len()))?;
        }
    }
    info!(
        "{}: {:#x} -> {:#x} bytes",
        args.output.as_deref().unwrap_or("<stdout>"),
        input.len(),
        output.len()
    );
    Ok(())
}

/// Runs the zinfo program in `zinfo` over `input` and returns the finished image.
pub fn build_image(input: &[u8], zinfo: &[u8], capacity: usize) -> Result<Vec<u8>> {
    let records = parse_zinfo(zinfo)?;
    debug!("{} zinfo records", records.len());
    let output = Interpreter::new(input, capacity, &Nrv2b).run(&records)?;
    Ok(output.into_bytes())
}

fn read_file(path: &str) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("could not read {path}"))
}
