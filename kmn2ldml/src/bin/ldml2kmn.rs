use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::fs;
use std::path::PathBuf;
use kmn2ldml::convert_ldml_file;

#[derive(Parser, Debug)]
#[command(author, version, about = "LDML keyboard to KMN keyboard source converter", long_about = None)]
struct Args {
    /// Input LDML file path
    input: PathBuf,

    /// Output KMN file path (defaults to input with .kmn extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Where to write the compiled touch layout, when the keyboard has one
    #[arg(long)]
    touch_output: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn run(args: Args) -> Result<()> {
    let output_path = args.output.clone().unwrap_or_else(|| {
        let mut path = args.input.clone();
        path.set_extension("kmn");
        path
    });

    info!("Converting {} to {}", args.input.display(), output_path.display());

    let output = convert_ldml_file(&args.input)
        .with_context(|| format!("Failed to convert {}", args.input.display()))?;
    for warning in &output.warnings {
        warn!("{}", warning);
    }

    fs::write(&output_path, &output.kmn)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    match (&args.touch_output, &output.touch_layout) {
        (Some(path), Some(layout)) => {
            fs::write(path, layout.to_json()?)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        (Some(_), None) => warn!("Keyboard has no touch layers, no touch layout written"),
        _ => {}
    }

    info!("Conversion successful");
    Ok(())
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
