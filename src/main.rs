use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use fwunwrap::{
    ExtractionOutcome, Extractor, ExtractorConfig, FormatTag, Notifier, ToolConfig,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(help = "Firmware blob to extract (e.g., firmware.zip, system.img)")]
    blob: PathBuf,

    #[arg(
        default_value = "./extracted",
        help = "Output directory for the extracted tree"
    )]
    output: PathBuf,

    #[arg(
        short,
        long,
        help = "Skip detection and treat the blob as this format (zip, tar, lz4, brotli, sparse-image, payload-bundle, checksum-sidecar)"
    )]
    format: Option<FormatTag>,

    #[arg(
        long,
        default_value_t = fwunwrap::config::DEFAULT_MAX_DEPTH,
        help = "Deepest nesting level unwrapped below the blob"
    )]
    max_depth: usize,

    #[arg(long, default_value = "simg2img", help = "Sparse to raw image converter")]
    simg2img: PathBuf,

    #[arg(long, help = "Run mount/umount without sudo")]
    no_sudo: bool,

    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Verbose mode (-v for info, -vv for debug, -vvv for trace). Also switches to text-based progress"
    )]
    verbose: u8,
}

/// Every branch unwrapped.
const EXIT_COMPLETE: u8 = 0;
/// Manifest written, but some nested branches failed.
const EXIT_PARTIAL: u8 = 2;

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<u8> {
    let cli = Cli::parse();

    // Logging level follows -v; in quiet mode log lines print above the spinner
    let notifier = Rc::new(Notifier::new(cli.verbose));
    notifier
        .install_logger()
        .context("Failed to initialize logging")?;

    info!("Starting fwunwrap with blob: {}", cli.blob.display());
    debug!("Output directory: {}", cli.output.display());
    debug!("Forced format: {:?}", cli.format);
    debug!("Max depth: {}", cli.max_depth);

    let tools = ToolConfig {
        simg2img: cli.simg2img,
        use_sudo: !cli.no_sudo,
        ..ToolConfig::default()
    };
    let config = ExtractorConfig::default()
        .with_max_depth(cli.max_depth)
        .with_forced_format(cli.format)
        .with_tools(tools);

    let extractor = Extractor::new(config).with_observer(Rc::clone(&notifier));

    let result = extractor.extract(&cli.blob, &cli.output);
    notifier.finish("Done");
    let outcome = result.with_context(|| format!("Failed to extract {}", cli.blob.display()))?;

    match outcome {
        ExtractionOutcome::Completed(manifest) => {
            println!(
                "Extracted {} files into {}",
                manifest.files.len(),
                cli.output.display()
            );
            if manifest.complete {
                Ok(EXIT_COMPLETE)
            } else {
                for failure in &manifest.failed_branches {
                    eprintln!(
                        "  not extracted: {} ({}): {}",
                        failure.path.display(),
                        failure.format,
                        failure.message
                    );
                }
                Ok(EXIT_PARTIAL)
            }
        }
        ExtractionOutcome::Delegated { blob, format } => {
            println!(
                "{} is a {}; extract it with an OTA payload dumper",
                blob.display(),
                format
            );
            Ok(EXIT_COMPLETE)
        }
    }
}
