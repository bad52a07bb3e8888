use clap::{Parser, Subcommand};
use pagelift::config::{OutputFormat, ServiceConfig, stock_config_toml};
use pagelift::processor::{ImageProcessor, ProcessError, ProcessOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pagelift")]
#[command(about = "Normalize raster images into Document/Page records")]
#[command(long_about = "\
Normalize raster images into Document/Page records

Takes a local image file, re-encodes it within configured size bounds
(flattening transparency onto white), writes the artifact and an optional
thumbnail into the workspace image store, and prints the resulting Document
as JSON for the document-assembly consumer.

Output layout:

  {workspace}/
  └── image_store/
      ├── img_<12-hex>.webp          # Normalized artifact (path+mtime hash)
      └── thumbnails/
          └── thumb_img_<12-hex>.jpg

Accepted inputs: .jpg .jpeg .png .webp .bmp .tiff .tif
Output formats:  webp (default), jpeg

Run 'pagelift gen-config' to print a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Config file (stock defaults when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process one image into a Document, printed as JSON
    Process {
        /// Path to the source image
        file: PathBuf,
        /// Workspace directory (config default when omitted)
        #[arg(long)]
        workspace: Option<PathBuf>,
        /// Output format: webp or jpeg
        #[arg(long)]
        format: Option<String>,
        /// Document id (generated when omitted)
        #[arg(long)]
        document_id: Option<String>,
    },
    /// List the accepted source extensions
    Formats,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::default(),
    };

    match cli.command {
        Command::Process {
            file,
            workspace,
            format,
            document_id,
        } => {
            let output_format = format
                .map(|f| {
                    f.parse::<OutputFormat>()
                        .map_err(|_| ProcessError::UnsupportedOutputFormat(f))
                })
                .transpose()?;

            let processor = ImageProcessor::new(config)?;
            let options = ProcessOptions {
                workspace,
                output_format,
                document_id,
            };
            let document = processor.process(&file, &options)?;
            processor.shutdown();

            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        Command::Formats => {
            for ext in &config.supported_extensions {
                println!("{ext}");
            }
        }
        Command::GenConfig => {
            print!("{}", stock_config_toml());
        }
    }

    Ok(())
}
