use std::path::PathBuf;

use clap::Parser;

use topics::corpus;
use topics::error::Result;

/// Writes an evenly spaced sample of a JSONL corpus to a smaller file.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(help = "Corpus to sample from")]
    input: PathBuf,

    #[clap(help = "Where to write the sample")]
    output: PathBuf,

    #[clap(help = "Share of records to keep, in percent (0, 100]")]
    percentage: f64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let written = corpus::sample_lines(&args.input, &args.output, args.percentage)?;
    println!("✅ Wrote {} records to {}", written, args.output.display());
    Ok(())
}
