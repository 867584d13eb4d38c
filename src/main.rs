use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use topics::config::PipelineConfig;
use topics::{error, pipeline, report};

#[derive(Parser, Debug)]
#[command(version, about = "Discover LDA topics in preprocessed paragraphs", long_about = None)]
struct Args {
    /// JSONL corpus files; defaults to the two reference corpora
    inputs: Vec<PathBuf>,
    #[clap(short, long, help = "JSON file with pipeline settings")]
    config: Option<PathBuf>,
    #[clap(short = 'k', long = "num-topics", help = "Topic counts to train, one model each (e.g. -k 10 -k 20)")]
    num_topics: Vec<usize>,
    #[clap(short, long, help = "Output path template, '{num_topics}' is replaced by the topic count")]
    output: Option<String>,
    #[clap(long, help = "Disable progress bars")]
    no_progress: bool,
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[clap(short, long)]
    quiet: bool,
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("TOPICS_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn load_config(args: &Args) -> error::Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if !args.inputs.is_empty() {
        config.inputs = args.inputs.clone();
    }
    if !args.num_topics.is_empty() {
        config.topic_counts = args.num_topics.clone();
    }
    if let Some(output) = &args.output {
        config.output_template = output.clone();
    }
    if args.no_progress {
        config.progress = false;
    }
    Ok(config)
}

fn main() -> error::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose, args.quiet);

    let config = load_config(&args)?;
    let summary = pipeline::run(&config)?;

    for run in &summary.runs {
        report::print_topics(run.num_topics, &run.topics);
        println!("   Coherence (c_v): {:.4}", run.coherence);
        println!("   Written to {}", run.output.display());
    }

    if summary.runs.len() > 1 {
        println!("\n📊 Coherence by topic count:");
        for (num_topics, score) in summary.coherence() {
            println!("   {:>4} topics: {:.4}", num_topics, score);
        }
    }

    Ok(())
}
