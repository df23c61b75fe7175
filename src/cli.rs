use clap::Parser;

fn parse_usize_with_hex(input: &str) -> Result<usize, String> {
    let s = input.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16).map_err(|e| format!("invalid hex value '{input}': {e}"))
    } else {
        s.parse::<usize>()
            .map_err(|e| format!("invalid decimal value '{input}': {e}"))
    }
}

#[derive(Debug, Parser)]
#[command(name = "zbin", version, about = "Build a compressed image from a binary and its zinfo layout")]
pub struct Args {
    /// Raw input binary.
    #[arg(value_name = "INPUT")]
    pub input: String,

    /// Layout records for INPUT.
    #[arg(value_name = "ZINFO")]
    pub zinfo: String,

    /// Output path; standard output when omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<String>,

    /// Output capacity in bytes (default: four times the input size).
    #[arg(long = "capacity", value_parser = parse_usize_with_hex)]
    pub capacity: Option<usize>,

    #[arg(long = "verbose", short = 'v')]
    pub verbose: bool,

    #[arg(long = "quiet", short = 'q', conflicts_with = "verbose")]
    pub quiet: bool,
}
