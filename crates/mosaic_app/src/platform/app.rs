use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use engine_logging::{engine_info, engine_warn, LogDestination};
use log::LevelFilter;
use mosaic_core::{BlockSize, FilterId, ImageUpload, JobViewModel};
use mosaic_engine::{ClientSettings, MosaicApi, Orchestrator, PollSettings, ReqwestMosaicClient};

use super::config::{self, AppConfig, CONFIG_FILENAME};
use super::render::{self, TerminalSink};

/// Turn a target image into a mosaic of element tiles using a remote mosaic service.
#[derive(Debug, Parser)]
#[command(version)]
pub(crate) struct Args {
    /// Tile image (png, jpg or jpeg).
    element: PathBuf,

    /// Image to reproduce as a mosaic.
    target: PathBuf,

    /// Filter to apply once the mosaic is complete.
    #[arg(long, value_name = "NAME")]
    filter: Option<String>,

    /// Regenerate with this block size (8, 16, 32 or 64) once complete.
    #[arg(long, value_name = "PIXELS")]
    block_size: Option<u32>,

    /// Fetch quality metrics for the finished mosaic.
    #[arg(long)]
    metrics: bool,

    /// Use the one-shot generate endpoint instead of the staged pipeline.
    #[arg(long)]
    legacy: bool,

    /// Configuration file.
    #[arg(long, value_name = "PATH", default_value = CONFIG_FILENAME)]
    config: PathBuf,

    /// Service origin; overrides the configuration file.
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Log debug output.
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
    }

    fn requested_block_size(&self) -> anyhow::Result<Option<BlockSize>> {
        self.block_size
            .map(BlockSize::try_from)
            .transpose()
            .map_err(anyhow::Error::from)
    }
}

pub(crate) async fn run_app() -> anyhow::Result<()> {
    let args = Args::parse();
    let (mut config, config_problem) = config::load_config(&args.config);
    args.apply_overrides(&mut config);

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    engine_logging::initialize(LogDestination::terminal_or_both(config.log_to_file), level);
    if let Some(err) = config_problem {
        engine_warn!("{}; using defaults", err);
    }

    // Reject bad input before talking to the service.
    let block_size = args.requested_block_size()?;
    let element = read_image(&args.element)?;
    let target = read_image(&args.target)?;

    let settings = config.client_settings()?;
    let client = ReqwestMosaicClient::new(settings.clone())?;
    engine_info!("Using mosaic service at {}", settings.base_url);

    if args.legacy {
        return run_legacy(client, &settings, &element, &target).await;
    }

    let api: Arc<dyn MosaicApi> = Arc::new(client);
    let sink = Arc::new(TerminalSink::new());
    let orchestrator = Orchestrator::new(api, config.poll_settings(), sink);

    if let Err(err) = orchestrator.load_filters().await {
        engine_warn!("Filter catalog unavailable: {}", err);
    }

    let view = orchestrator.submit(Some(element), Some(target)).await;
    ensure_no_error(&view)?;
    orchestrator.wait_for_polling().await;
    ensure_no_error(&orchestrator.view())?;

    if let Some(size) = block_size {
        ensure_no_error(&orchestrator.change_block_size(size).await)?;
    }
    if let Some(filter) = &args.filter {
        ensure_no_error(&orchestrator.apply_filter(FilterId::new(filter.as_str())).await)?;
    }
    if args.metrics {
        orchestrator.refresh_metrics().await?;
    }

    for line in render::summary_lines(&orchestrator.view(), &settings) {
        println!("{line}");
    }
    Ok(())
}

async fn run_legacy(
    client: ReqwestMosaicClient,
    settings: &ClientSettings,
    element: &ImageUpload,
    target: &ImageUpload,
) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(
        Arc::new(client),
        PollSettings::default(),
        Arc::new(TerminalSink::new()),
    );
    let mosaic = orchestrator.generate_legacy(element, target).await?;
    println!(
        "simple mosaic: {}",
        render::resolved(settings, &mosaic.simple_mosaic_url)
    );
    println!("mosaic: {}", render::resolved(settings, &mosaic.mosaic_url));
    Ok(())
}

fn read_image(path: &Path) -> anyhow::Result<ImageUpload> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("{} is not a file", path.display()))?;
    let image = ImageUpload::new(file_name, bytes);
    image.validate()?;
    Ok(image)
}

fn ensure_no_error(view: &JobViewModel) -> anyhow::Result<()> {
    match &view.error {
        Some(error) => bail!("{error}"),
        None => Ok(()),
    }
}
