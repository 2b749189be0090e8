//! Logging setup
//!
//! Console output is always available. When a log directory is configured,
//! events are also written to rotated files (daily unless `RELAY_LOG_ROTATION`
//! says otherwise):
//!
//! | Log File     | Component                   | Target Prefixes |
//! |--------------|-----------------------------|-----------------|
//! | relay.log    | Root logger (all components) | (all)           |
//! | service.log  | Service lifecycle and RPC    | relay_service   |
//! | storage.log  | Storage adapter and engines  | relay_storage   |
//! | bus.log      | Broker connection            | relay_bus       |
//!
//! `RUST_LOG` controls the level of the console and root file layers.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Environment variable overriding the log directory
pub const LOG_DIR_ENV: &str = "RELAY_LOG_DIR";

/// Environment variable selecting the rotation policy: daily, hourly or never
pub const LOG_ROTATION_ENV: &str = "RELAY_LOG_ROTATION";

const ROOT_LOG_FILE: &str = "relay.log";

struct ComponentLogDef {
    file_name: &'static str,
    targets: &'static [&'static str],
}

const COMPONENT_LOGS: &[ComponentLogDef] = &[
    ComponentLogDef {
        file_name: "service.log",
        targets: &["relay_service"],
    },
    ComponentLogDef {
        file_name: "storage.log",
        targets: &["relay_storage"],
    },
    ComponentLogDef {
        file_name: "bus.log",
        targets: &["relay_bus"],
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    Daily,
    Hourly,
    Never,
}

impl std::str::FromStr for LogRotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(LogRotation::Daily),
            "hourly" => Ok(LogRotation::Hourly),
            "never" => Ok(LogRotation::Never),
            other => Err(format!("unknown log rotation '{}'", other)),
        }
    }
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// File logging is enabled only when set
    pub log_dir: Option<PathBuf>,
    pub console_output: bool,
    /// Level used when `RUST_LOG` is unset
    pub level: Level,
    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            console_output: true,
            level: Level::INFO,
            rotation: LogRotation::Daily,
        }
    }
}

impl LoggingConfig {
    /// Build from the command line, falling back to `RELAY_LOG_DIR`
    pub fn new(log_dir: Option<PathBuf>) -> Self {
        let log_dir = log_dir.or_else(|| std::env::var(LOG_DIR_ENV).ok().map(PathBuf::from));
        let rotation = std::env::var(LOG_ROTATION_ENV)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(LogRotation::Daily);
        Self {
            log_dir,
            rotation,
            ..Self::default()
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.to_string()))
    }
}

/// Keeps the non-blocking file writers alive; dropping it flushes buffered output
pub struct LoggingGuard {
    _file_guards: Vec<WorkerGuard>,
}

/// Install the global subscriber
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let mut guards: Vec<WorkerGuard> = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console_output {
        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_filter(config.env_filter());
        layers.push(Box::new(console_layer));
    }

    if let Some(log_dir) = &config.log_dir {
        std::fs::create_dir_all(log_dir)?;

        let root_appender = RollingFileAppender::new(config.rotation.into(), log_dir, ROOT_LOG_FILE);
        let (root_nb, root_guard) = tracing_appender::non_blocking(root_appender);
        guards.push(root_guard);
        layers.push(Box::new(
            fmt::layer()
                .with_writer(root_nb)
                .with_target(true)
                .with_ansi(false)
                .with_filter(config.env_filter()),
        ));

        for component in COMPONENT_LOGS {
            let appender =
                RollingFileAppender::new(config.rotation.into(), log_dir, component.file_name);
            let (nb, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);

            let mut targets = Targets::new();
            for target in component.targets {
                targets = targets.with_target(*target, LevelFilter::TRACE);
            }
            layers.push(Box::new(
                fmt::layer()
                    .with_writer(nb)
                    .with_target(true)
                    .with_ansi(false)
                    .with_filter(targets),
            ));
        }
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    if let Some(log_dir) = &config.log_dir {
        tracing::info!(
            log_dir = %log_dir.display(),
            component_files = COMPONENT_LOGS.len(),
            "file logging initialized"
        );
    }

    Ok(LoggingGuard {
        _file_guards: guards,
    })
}
