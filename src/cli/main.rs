//! Background removal CLI
//!
//! Prints one line on stdout: the result, or the failure sentinel. Failures
//! exit with status 0 unless `--exit-code` is given.

use super::config::CliConfigBuilder;
use crate::{
    cache::{format_size, ModelCache},
    config::RemovalConfig,
    download::ModelDownloader,
    elapsed_ms,
    error::BgRemovalError,
    load_input_image,
    models::ModelKind,
    processor::BackgroundRemovalProcessor,
    render_removal,
    services::render_failure,
    tracing_config::init_cli_tracing,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use instant::Instant;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Flags that run a maintenance command instead of processing an input
const MAINTENANCE_FLAGS: [&str; 5] = [
    "download_only",
    "list_models",
    "clear_cache",
    "show_cache_dir",
    "show_providers",
];

/// Remove the background of an image and print the PNG as base64
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-b64")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image file
    #[arg(
        value_name = "INPUT",
        required_unless_present_any = MAINTENANCE_FLAGS,
        conflicts_with_all = MAINTENANCE_FLAGS
    )]
    pub input: Option<PathBuf>,

    /// Model name from the registry or path to an .onnx file
    #[arg(short, long)]
    pub model: Option<String>,

    /// Preprocessing profile (model name) for an external model file
    #[arg(long, value_name = "MODEL")]
    pub preprocessing: Option<String>,

    /// Inference engine [default: tract when compiled in]
    #[arg(short, long, value_enum)]
    pub backend: Option<CliBackend>,

    /// ONNX Runtime execution provider (auto, cpu, cuda, coreml)
    #[arg(short, long, default_value = "auto")]
    pub execution_provider: String,

    /// Number of intra-op threads (0 = auto)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = CliOutputFormat::Base64)]
    pub format: CliOutputFormat,

    /// Output the segmentation mask instead of the cutout
    #[arg(long)]
    pub only_mask: bool,

    /// Reject inputs larger than this many bytes
    #[arg(long, value_name = "BYTES")]
    pub max_size: Option<u64>,

    /// Accepted input formats, comma separated (e.g. png,jpeg)
    #[arg(long, value_delimiter = ',', value_name = "FORMATS")]
    pub accept: Vec<String>,

    /// Exit with a non-zero status per failure kind instead of always 0
    #[arg(long)]
    pub exit_code: bool,

    /// Log to stderr (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Use custom cache directory
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Download the selected model and exit
    #[arg(long)]
    pub download_only: bool,

    /// List registry models and their cache status, then exit
    #[arg(long)]
    pub list_models: bool,

    /// Show the cache directory and exit
    #[arg(long)]
    pub show_cache_dir: bool,

    /// Clear cached models (combine with --model to clear one model)
    #[arg(long)]
    pub clear_cache: bool,

    /// List ONNX Runtime execution providers and exit
    #[arg(long)]
    pub show_providers: bool,

    /// Show a download progress bar on stderr
    #[arg(long)]
    pub progress: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliBackend {
    Tract,
    Onnx,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliOutputFormat {
    /// Bare base64 PNG
    Base64,
    /// data:image/png;base64,... URL
    DataUrl,
    /// JSON envelope with status, message and duration
    Json,
}

pub async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Runs without a subscriber rather than adding output
    init_cli_tracing(cli.verbose).ok();

    match cli.input.as_deref() {
        Some(input) => process(&cli, input).await,
        None => {
            run_maintenance(&cli).await?;
            Ok(ExitCode::SUCCESS)
        },
    }
}

/// Process one input and print its result line
async fn process(cli: &Cli, input: &Path) -> Result<ExitCode> {
    let start = Instant::now();
    let config = CliConfigBuilder::from_cli(cli);
    let mode = config
        .as_ref()
        .map_or_else(|_| cli.format.into(), |config| config.output_mode);

    let outcome = match config {
        Ok(config) => remove_background(cli, config, input, start).await,
        Err(e) => Err(e),
    };

    let (line, code) = match outcome {
        Ok(line) => (line, ExitCode::SUCCESS),
        Err(e) => {
            let kind = e.kind();
            tracing::error!(kind = %kind, error = %e, "Background removal failed");
            let code = if cli.exit_code {
                ExitCode::from(u8::try_from(kind.exit_code()).unwrap_or(1))
            } else {
                ExitCode::SUCCESS
            };
            (render_failure(kind, mode, elapsed_ms(start)), code)
        },
    };

    write_line(&line)?;
    Ok(code)
}

/// Run one removal, returning the rendered result line
async fn remove_background(
    cli: &Cli,
    config: RemovalConfig,
    input: &Path,
    start: Instant,
) -> crate::Result<String> {
    tracing::info!(
        input = %input.display(),
        model = %config.model_spec.source.display_name(),
        backend = %config.backend_type,
        "Starting background removal"
    );

    let image = load_input_image(input, &config)?;
    let cache = CliConfigBuilder::cache(cli).map_err(BgRemovalError::in_model_stage)?;
    let mut processor = BackgroundRemovalProcessor::new(config, cache)?;
    render_removal(&mut processor, &image, cli.progress, start).await
}

/// Run the maintenance command selected on the command line
async fn run_maintenance(cli: &Cli) -> Result<()> {
    if cli.show_providers {
        show_providers();
        Ok(())
    } else if cli.list_models {
        list_models(cli)
    } else if cli.show_cache_dir {
        show_cache_dir(cli)
    } else if cli.clear_cache {
        clear_cache(cli)
    } else {
        download_only(cli).await
    }
}

fn write_line(line: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}").context("Failed to write to stdout")?;
    stdout.flush().context("Failed to flush stdout")
}

fn list_models(cli: &Cli) -> Result<()> {
    let cache = CliConfigBuilder::cache(cli).context("Failed to initialize model cache")?;
    let cached = cache
        .scan_cached_models()
        .context("Failed to list cached models")?;

    println!("Models (cache: {})", cache.cache_dir().display());
    for kind in ModelKind::ALL {
        let status = match cached.iter().find(|info| info.kind == kind) {
            Some(info) if info.verified => format!("cached, verified, {}", format_size(info.size_bytes)),
            Some(info) => format!("cached, {}", format_size(info.size_bytes)),
            None => "not cached".to_string(),
        };
        let default_marker = if kind == ModelKind::default() { " (default)" } else { "" };
        println!(
            "  {:<18} {}px  {}{default_marker} [{status}]",
            kind.name(),
            kind.input_size(),
            kind.description()
        );
    }
    Ok(())
}

fn show_providers() {
    #[cfg(feature = "onnx")]
    {
        println!("ONNX Runtime execution providers:");
        for (name, available, description) in crate::backends::OnnxBackend::list_providers() {
            let status = if available { "available" } else { "not available" };
            println!("  {name:<8} {status:<14} {description}");
        }
    }
    #[cfg(not(feature = "onnx"))]
    println!("ONNX Runtime backend not compiled in (enable feature 'onnx'); tract runs on the CPU");
}

fn show_cache_dir(cli: &Cli) -> Result<()> {
    let cache = CliConfigBuilder::cache(cli).context("Failed to access cache directory")?;
    println!("{}", cache.cache_dir().display());
    Ok(())
}

fn clear_cache(cli: &Cli) -> Result<()> {
    let cache = CliConfigBuilder::cache(cli).context("Failed to access cache directory")?;

    if let Some(kind) = CliConfigBuilder::named_model(cli)? {
        if cache
            .clear_model(kind)
            .with_context(|| format!("Failed to clear model '{kind}'"))?
        {
            println!("Removed {kind} from {}", cache.cache_dir().display());
        } else {
            println!("Model '{kind}' was not cached");
        }
        return Ok(());
    }

    let removed = cache.clear_all_models().context("Failed to clear cache")?;
    if removed.is_empty() {
        println!("Cache was already empty");
    } else {
        let names: Vec<&str> = removed.iter().map(|kind| kind.name()).collect();
        println!("Removed {} model(s): {}", removed.len(), names.join(", "));
    }
    Ok(())
}

async fn download_only(cli: &Cli) -> Result<()> {
    let kind = CliConfigBuilder::named_model(cli)?.unwrap_or_default();
    let cache: ModelCache =
        CliConfigBuilder::cache(cli).context("Failed to initialize model cache")?;
    let downloader = ModelDownloader::new(cache).context("Failed to create model downloader")?;

    downloader
        .download_model(kind, cli.progress)
        .await
        .with_context(|| format!("Failed to download model '{kind}'"))?;

    println!("{}", downloader.cache().model_path(kind).display());
    Ok(())
}

