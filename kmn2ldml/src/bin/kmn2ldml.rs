use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::fs;
use std::path::PathBuf;
use kmn2ldml::touch_layout::TouchLayoutFile;
use kmn2ldml::virtual_keys::HardwareForm;
use kmn2ldml::{convert_kmn_file, CompilerOptions};

#[derive(Parser, Debug)]
#[command(author, version, about = "KMN keyboard source to LDML keyboard converter", long_about = None)]
struct Args {
    /// Input KMN file path
    input: PathBuf,

    /// Output LDML file path (defaults to input with .xml extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// BCP 47 locale of the keyboard
    #[arg(long)]
    locale: String,

    /// LDML version the document conforms to
    #[arg(long, default_value = "45")]
    conforms_to: String,

    /// Keyboard id (defaults to the input file stem)
    #[arg(long)]
    keyboard_id: Option<String>,

    /// Hardware form of the generated layers
    #[arg(long, default_value = "us")]
    hardware_form: HardwareForm,

    /// Touch layout to convert into LDML touch layers
    #[arg(long)]
    touch_layout: Option<PathBuf>,

    /// Where to write the compiled touch layout
    #[arg(long)]
    touch_output: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn run(args: Args) -> Result<()> {
    let output_path = args.output.clone().unwrap_or_else(|| {
        let mut path = args.input.clone();
        path.set_extension("xml");
        path
    });

    let keyboard_id = match &args.keyboard_id {
        Some(id) => id.clone(),
        None => args
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .context("input path has no file name")?,
    };

    let mut builder = CompilerOptions::builder()
        .keyboard_id(keyboard_id)
        .locale(&args.locale)
        .conforms_to(&args.conforms_to)
        .hardware_form(args.hardware_form);
    if let Some(path) = &args.touch_layout {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read touch layout {}", path.display()))?;
        let layout = TouchLayoutFile::from_json(&json)
            .with_context(|| format!("Failed to parse touch layout {}", path.display()))?;
        builder = builder.touch_layout(layout);
    }
    let options = builder.build()?;

    info!("Converting {} to {}", args.input.display(), output_path.display());

    let output = convert_kmn_file(&args.input, &options)
        .with_context(|| format!("Failed to convert {}", args.input.display()))?;
    for warning in &output.warnings {
        warn!("{}", warning);
    }

    let xml = output.to_xml()?;
    fs::write(&output_path, xml)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    if let Some(path) = &args.touch_output {
        fs::write(path, output.touch_layout.to_json()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    info!("Conversion successful with {} warnings", output.warnings.len());
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
