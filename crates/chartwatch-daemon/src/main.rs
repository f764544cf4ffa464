//! Chartwatch daemon entry point.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use chartwatch::{
    DynamicKeying, PageContentProvider, ReadinessPolicy, Reconciler, Scheduler, SnapshotExtractor,
    SqliteGateway, TrackerResult,
};
use chartwatch_daemon::config::{describe_database, Overrides, RunOptions, Settings};
use chartwatch_daemon::ChromiumPage;

#[derive(Parser)]
#[command(
    name = "chartwatch",
    about = "Track storefront top-chart prices in a local database",
    version
)]
struct Cli {
    /// Chart page to scrape.
    #[arg(long, global = true)]
    storefront_url: Option<String>,

    /// Seconds between observation cycles.
    #[arg(long, global = true)]
    loop_delay: Option<u64>,

    /// Database host (accepted for compatibility, ignored).
    #[arg(long, global = true)]
    db_host: Option<String>,

    /// Database user (accepted for compatibility, ignored).
    #[arg(long, global = true)]
    db_user: Option<String>,

    /// Database password (accepted for compatibility, ignored).
    #[arg(long, global = true)]
    db_password: Option<String>,

    /// Database name; `:memory:` keeps everything in memory.
    #[arg(long, global = true)]
    db_name: Option<String>,

    /// Directory holding the database file.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// JSON file overriding the built-in selectors.
    #[arg(long, global = true)]
    selectors: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(clap::Args, Clone)]
struct RunArgs {
    /// Navigation timeout in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    nav_timeout_ms: u64,

    /// Give up scrolling after this many scrolls.
    #[arg(long, default_value_t = 120)]
    scroll_max_iterations: u32,

    /// Give up scrolling after this many seconds.
    #[arg(long, default_value_t = 300)]
    scroll_max_secs: u64,

    /// Keep every observation instead of only the latest per app.
    #[arg(long)]
    keep_history: bool,

    /// Do not clear the dynamic table at startup.
    #[arg(long)]
    keep_dynamic: bool,

    /// Run Chromium with a visible window.
    #[arg(long)]
    show_browser: bool,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            nav_timeout_ms: 30_000,
            scroll_max_iterations: 120,
            scroll_max_secs: 300,
            keep_history: false,
            keep_dynamic: false,
            show_browser: false,
        }
    }
}

impl RunArgs {
    fn keying(&self) -> DynamicKeying {
        if self.keep_history {
            DynamicKeying::History
        } else {
            DynamicKeying::LatestOnly
        }
    }

    fn options(&self) -> RunOptions {
        RunOptions {
            nav_timeout: Duration::from_millis(self.nav_timeout_ms),
            readiness: ReadinessPolicy {
                max_iterations: self.scroll_max_iterations,
                max_wait: Duration::from_secs(self.scroll_max_secs),
                ..ReadinessPolicy::default()
            },
            keying: self.keying(),
            keep_dynamic: self.keep_dynamic,
            headless: !self.show_browser,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Bootstrap, then observe prices until interrupted (default).
    Run(RunArgs),

    /// Bootstrap and record a single observation, then exit.
    Once(RunArgs),

    /// Create the database and tables without scraping.
    InitDb {
        /// Create the dynamic table with one row per observation.
        #[arg(long)]
        keep_history: bool,
    },

    /// Print the effective selectors as JSON.
    Selectors,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   chartwatch completions bash > ~/.local/share/bash-completion/completions/chartwatch
    ///   chartwatch completions zsh > ~/.zfunc/_chartwatch
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    if let Err(e) = dispatch(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let command = cli
        .command
        .unwrap_or_else(|| Commands::Run(RunArgs::default()));

    if let Commands::Completions { shell } = command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "chartwatch", &mut std::io::stdout());
        return Ok(());
    }

    let settings = Settings::resolve(Overrides {
        storefront_url: cli.storefront_url,
        loop_delay_secs: cli.loop_delay,
        db_host: cli.db_host,
        db_user: cli.db_user,
        db_password: cli.db_password,
        db_name: cli.db_name,
        data_dir: cli.data_dir,
        selectors_path: cli.selectors,
    })?;

    match command {
        Commands::Run(args) => scrape(&settings, &args.options(), Mode::Forever).await,
        Commands::Once(args) => scrape(&settings, &args.options(), Mode::Once).await,
        Commands::InitDb { keep_history } => {
            let keying = if keep_history {
                DynamicKeying::History
            } else {
                DynamicKeying::LatestOnly
            };
            let gateway = settings.open_storage(keying)?;
            println!("Database ready: {}", describe_database(&settings));
            println!("  Static rows: {}", gateway.static_rows()?.len());
            println!("  Dynamic rows: {}", gateway.dynamic_rows()?.len());
            gateway.close()?;
            Ok(())
        }
        Commands::Selectors => {
            let json = serde_json::to_string_pretty(&settings.selectors)
                .context("failed to serialize selectors")?;
            println!("{json}");
            Ok(())
        }
        Commands::Completions { .. } => Ok(()),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Once,
    Forever,
}

async fn scrape(settings: &Settings, options: &RunOptions, mode: Mode) -> Result<()> {
    tracing::info!("Chartwatch {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Database: {}", describe_database(settings));
    if let Some(path) = &settings.selectors_path {
        tracing::info!("Selectors: {}", path.display());
    }

    let gateway = settings.open_storage(options.keying)?;
    let page = ChromiumPage::launch(&options.browser_options()).await?;

    let mut scheduler = Scheduler::new(
        page,
        Reconciler::new(gateway),
        SnapshotExtractor::from_selectors(&settings.selectors),
        settings.scheduler_config(options),
    );

    let outcome = match mode {
        Mode::Once => run_once(&mut scheduler).await,
        Mode::Forever => tokio::select! {
            result = scheduler.run() => result,
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::warn!("Failed to listen for Ctrl-C: {e}");
                }
                tracing::info!("Interrupted, shutting down");
                Ok(())
            }
        },
    };

    let (page, reconciler) = scheduler.into_parts();
    shutdown(page, reconciler.into_inner()).await;
    outcome.context("scraping stopped")
}

async fn run_once(scheduler: &mut Scheduler<ChromiumPage, SqliteGateway>) -> TrackerResult<()> {
    scheduler.bootstrap().await?;
    scheduler.observe().await?;
    Ok(())
}

async fn shutdown(mut page: ChromiumPage, gateway: SqliteGateway) {
    if let Err(e) = page.close().await {
        tracing::warn!("Failed to close browser: {e}");
    }
    if let Err(e) = gateway.close() {
        tracing::warn!("Failed to close database: {e}");
    }
}
