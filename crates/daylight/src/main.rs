use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand, ValueEnum};
use daylight::{
    local_date, telemetry, CaptureWindow, CommandListener, CommandSink, FfmpegLauncher,
    LaneRouter, Location, OutputPathResolver, PhotoStore, Scheduler, SnapshotFetcher,
};
use lapseconf::LapseConfig;
use lapseproto::{CameraId, CommandBus, MemoryBus};
use tokio_util::sync::CancellationToken;

/// Sunrise-to-sunset timelapse recorder
#[derive(Parser, Debug)]
#[command(
    name = "daylight-timelapse",
    version,
    about,
    long_about = None,
    after_help = "Short spellings take two dashes: --lat, --lon, --fm and --tz."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record today's timelapse until sunset (plus margin) or Ctrl-C
    Run(RunArgs),

    /// Print today's capture window
    Window(ScheduleArgs),

    /// Print the effective configuration and where it came from
    Config {
        /// Config file to use instead of ./timelapse.toml
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct ScheduleArgs {
    /// Camera name, used in the snapshot URL and output file names
    #[arg(short = 'n', long)]
    camera_name: String,

    /// Fetch a photo every N seconds
    #[arg(short, long)]
    every: Option<u64>,

    /// Latitude for the sunrise/sunset calculation
    #[arg(long, visible_alias = "lat", allow_negative_numbers = true)]
    latitude: Option<f64>,

    /// Longitude for the sunrise/sunset calculation
    #[arg(long, visible_alias = "lon", allow_negative_numbers = true)]
    longitude: Option<f64>,

    /// Extra frames before sunrise and after sunset, in units of --every
    #[arg(long, visible_alias = "fm")]
    frame_margin: Option<u32>,

    /// IANA time zone that decides which day "today" is, e.g. Europe/Berlin
    #[arg(long, visible_alias = "tz")]
    timezone: Option<String>,

    /// Config file to use instead of ./timelapse.toml
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    schedule: ScheduleArgs,

    /// Where frames go
    #[arg(long, value_enum, default_value_t = StoreMode::Video)]
    store: StoreMode,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum StoreMode {
    Video,
    Photo,
    Both,
}

impl StoreMode {
    fn video(self) -> bool {
        matches!(self, StoreMode::Video | StoreMode::Both)
    }

    fn photo(self) -> bool {
        matches!(self, StoreMode::Photo | StoreMode::Both)
    }
}

/// Load config and layer the CLI flags on top.
fn load_config(args: &ScheduleArgs) -> Result<LapseConfig> {
    let mut config =
        LapseConfig::load_from(args.config.as_deref()).context("Failed to load configuration")?;
    let schedule = &mut config.bootstrap.schedule;
    if let Some(every) = args.every {
        schedule.every = every;
    }
    if let Some(latitude) = args.latitude {
        schedule.latitude = latitude;
    }
    if let Some(longitude) = args.longitude {
        schedule.longitude = longitude;
    }
    if let Some(margin) = args.frame_margin {
        schedule.frame_margin = margin;
    }
    if let Some(timezone) = &args.timezone {
        schedule.timezone = timezone.clone();
    }
    if schedule.every == 0 {
        anyhow::bail!("--every must be at least one second");
    }
    Ok(config)
}

fn schedule_zone(config: &LapseConfig) -> Result<Tz> {
    let name = &config.bootstrap.schedule.timezone;
    name.parse::<Tz>()
        .map_err(|e| anyhow::anyhow!("unknown time zone {:?}: {}", name, e))
}

fn todays_window(config: &LapseConfig, tz: Tz) -> Result<CaptureWindow> {
    let schedule = &config.bootstrap.schedule;
    let today = local_date(Utc::now(), &tz);
    CaptureWindow::for_date(
        today,
        Location {
            latitude: schedule.latitude,
            longitude: schedule.longitude,
        },
        schedule.every,
        schedule.frame_margin,
    )
    .with_context(|| {
        format!(
            "the sun does not rise and set on {} ({}) at {}, {}",
            today, tz, schedule.latitude, schedule.longitude
        )
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Window(args) => {
            let config = load_config(&args)?;
            let tz = schedule_zone(&config)?;
            let window = todays_window(&config, tz)?;
            println!("camera:  {}", args.camera_name);
            println!("zone:    {}", tz);
            println!("sunrise: {}", window.sunrise.with_timezone(&tz));
            println!("sunset:  {}", window.sunset.with_timezone(&tz));
            println!("start:   {}", window.start.with_timezone(&tz));
            println!("stop:    {}", window.stop.with_timezone(&tz));
            Ok(())
        }
        Commands::Config { config } => {
            let (config, sources) = LapseConfig::load_with_sources_from(config.as_deref())
                .context("Failed to load configuration")?;
            print!("{}", config.to_toml());
            println!();
            if sources.files.is_empty() {
                println!("# No config files found, using defaults");
            } else {
                println!("# Loaded from:");
                for file in &sources.files {
                    println!("#   {}", file.display());
                }
            }
            if !sources.env_overrides.is_empty() {
                println!("# Environment overrides: {}", sources.env_overrides.join(", "));
            }
            Ok(())
        }
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let config = load_config(&args.schedule)?;
    telemetry::init(&config.infra.telemetry.log_level)
        .context("Failed to initialize logging")?;

    let camera = CameraId::new(args.schedule.camera_name.clone());
    let mode = args.store;

    let paths = OutputPathResolver::from_config(&config.infra.paths);
    paths
        .prepare(mode.video(), mode.photo())
        .context("Output directories are not usable")?;
    tracing::info!(
        videos = %paths.video_root().display(),
        logs = %paths.log_root().display(),
        photos = %paths.photo_root().display(),
        "output directories ready"
    );

    let tz = schedule_zone(&config)?;
    let window = todays_window(&config, tz)?;
    tracing::info!(
        camera = %camera,
        zone = %tz,
        sunrise = %window.sunrise.with_timezone(&tz),
        sunset = %window.sunset.with_timezone(&tz),
        start = %window.start.with_timezone(&tz),
        stop = %window.stop.with_timezone(&tz),
        "capture window"
    );

    let bus = CommandBus::new(Arc::new(MemoryBus::new()), config.infra.bus.namespace.clone());
    let cancel = CancellationToken::new();

    // Ctrl-C ends the run early; lanes still stop their encoders cleanly
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received, shutting down");
                cancel.cancel();
            }
        });
    }

    let mut sinks: Vec<Arc<dyn CommandSink>> = Vec::new();
    let router = if mode.video() {
        let launcher = Arc::new(FfmpegLauncher::new(config.infra.encoder.clone()));
        let router = Arc::new(LaneRouter::new(launcher, paths.clone()));
        sinks.push(router.clone());
        Some(router)
    } else {
        None
    };
    if mode.photo() {
        sinks.push(Arc::new(PhotoStore::new(paths.clone())));
    }

    // Subscribe before anything publishes; the bus does not replay
    let subscription = bus
        .subscribe_commands(&camera)
        .await
        .context("Failed to subscribe to commands")?;
    let listener = {
        let cancel = cancel.clone();
        let listener = CommandListener::new(sinks);
        tokio::spawn(async move { listener.run(subscription, cancel).await })
    };

    let fetcher = SnapshotFetcher::new(
        bus.clone(),
        camera.clone(),
        &config.bootstrap.camera,
        Duration::from_secs(config.bootstrap.schedule.every),
    )?;
    let fetcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move { fetcher.run(cancel).await })
    };

    let scheduler = Scheduler::new(bus.clone(), camera.clone(), window).with_timezone(tz);
    let scheduler = tokio::spawn(scheduler.run(cancel.clone()));

    cancel.cancelled().await;

    match scheduler.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "scheduler failed"),
        Err(e) => tracing::error!(error = %e, "scheduler task panicked"),
    }
    if let Err(e) = fetcher.await {
        tracing::error!(error = %e, "fetcher task panicked");
    }
    match listener.await {
        Ok(stats) => tracing::info!(
            dispatched = stats.dispatched,
            rejected = stats.rejected,
            "listener finished"
        ),
        Err(e) => tracing::error!(error = %e, "listener task panicked"),
    }
    if let Some(router) = router {
        router.shutdown().await;
    }

    tracing::info!(camera = %camera, "done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_short_spellings() {
        let cli = Cli::try_parse_from([
            "daylight-timelapse",
            "window",
            "-n",
            "harbour",
            "--lat",
            "-33.86",
            "--lon",
            "151.21",
            "--fm",
            "10",
            "--tz",
            "Australia/Sydney",
        ])
        .unwrap();
        let Commands::Window(args) = cli.command else {
            panic!("expected the window subcommand");
        };
        assert_eq!(args.camera_name, "harbour");
        assert_eq!(args.latitude, Some(-33.86));
        assert_eq!(args.longitude, Some(151.21));
        assert_eq!(args.frame_margin, Some(10));
        assert_eq!(args.timezone.as_deref(), Some("Australia/Sydney"));
    }

    #[test]
    fn test_schedule_zone() {
        let mut config = LapseConfig::default();
        assert_eq!(schedule_zone(&config).unwrap(), chrono_tz::Europe::Berlin);

        config.bootstrap.schedule.timezone = "Asia/Tokyo".to_string();
        assert_eq!(schedule_zone(&config).unwrap(), chrono_tz::Asia::Tokyo);

        config.bootstrap.schedule.timezone = "Mars/Olympus_Mons".to_string();
        let err = schedule_zone(&config).unwrap_err();
        assert!(err.to_string().contains("Mars/Olympus_Mons"));
    }
}
