// ABOUTME: Main application orchestration for the treeline CLI
// ABOUTME: Coordinates between CLI arguments, configuration, and command execution

use std::path::Path;

use anyhow::Result;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use super::commands;
use super::{Args, Commands, Config};

pub struct App {
    config: Config,
    log_guard: Option<WorkerGuard>,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            log_guard: None,
        }
    }

    /// Create the application from command line arguments.
    pub fn from_args(args: &Args) -> Result<Self> {
        let config = Config::load(args.config.clone())?;
        Ok(Self::new(config))
    }

    /// Initialize logging: a console layer at the configured level and,
    /// when a result directory is known, a debug-level file layer
    /// writing treeline.log next to the run artifacts.
    pub fn init_logging(&mut self, verbose: bool, no_color: bool, log_dir: Option<&Path>) {
        let console_level = if verbose {
            LevelFilter::DEBUG
        } else {
            match self.config.logging.level.as_str() {
                "debug" => LevelFilter::DEBUG,
                "warn" => LevelFilter::WARN,
                "error" => LevelFilter::ERROR,
                _ => LevelFilter::INFO,
            }
        };

        let compact = self.config.logging.format == "compact";
        let console_layer = tracing_subscriber::fmt::layer()
            .with_ansi(!no_color)
            .with_target(false);
        let console_layer = if compact {
            console_layer.compact().with_filter(console_level).boxed()
        } else {
            console_layer.with_filter(console_level).boxed()
        };

        let file_layer = log_dir.map(|dir| {
            let appender = tracing_appender::rolling::never(dir, "treeline.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            self.log_guard = Some(guard);
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(LevelFilter::DEBUG)
                .boxed()
        });

        tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .init();

        debug!("logging initialized");
    }

    /// Run the application with parsed arguments.
    pub async fn run(&mut self, args: Args) -> Result<()> {
        match args.command {
            Commands::Run { opts, headless } => {
                opts.apply_to(&mut self.config);
                self.config.validate()?;
                std::fs::create_dir_all(&self.config.output_dir)?;
                self.init_logging(args.verbose, args.no_color, Some(&self.config.output_dir.clone()));
                info!("treeline v{}", crate::VERSION);
                commands::run_pipeline(self.config.clone(), headless).await
            }

            Commands::Check { opts } => {
                opts.apply_to(&mut self.config);
                self.config.validate()?;
                self.init_logging(args.verbose, args.no_color, None);
                commands::check(self.config.clone()).await
            }

            Commands::Visualize { result_dir } => {
                let dir = commands::locate_results(result_dir.as_deref(), &self.config)?;
                self.init_logging(args.verbose, args.no_color, Some(&dir));
                info!("treeline v{}", crate::VERSION);
                commands::visualize(&dir, &self.config).await
            }

            Commands::View {
                result_dir,
                port,
                headless,
            } => {
                let dir = commands::locate_results(result_dir.as_deref(), &self.config)?;
                self.init_logging(args.verbose, args.no_color, None);
                let port = port.unwrap_or(self.config.server.port);
                commands::view(&dir, port, headless, &self.config).await
            }

            Commands::Export { result_dir, binary } => {
                let dir = commands::locate_results(result_dir.as_deref(), &self.config)?;
                self.init_logging(args.verbose, args.no_color, None);
                commands::export(&dir, binary.as_deref(), &self.config).await
            }
        }
    }
}
