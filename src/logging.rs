//! Global tracing subscriber.
//!
//! Logging has to run before the settings file is read, so the subscriber
//! starts at INFO and the configured level is applied afterwards.

use tracing::{info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{reload, FmtSubscriber};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Unable to install global subscriber: {0}")]
    Init(String),

    #[error("Failed to change log level: {0}")]
    Reload(#[from] reload::Error),
}

type ReloadFn = Box<dyn Fn(LevelFilter) -> Result<(), reload::Error> + Send + Sync>;

/// Changes the level of the installed subscriber.
pub struct LogLevelHandle {
    reload: ReloadFn,
}

impl LogLevelHandle {
    /// Applies `log_level`. Unknown names fall back to INFO.
    pub fn apply(&self, log_level: &str) -> Result<Level, LoggingError> {
        let level = log_level.parse::<Level>().unwrap_or(Level::INFO);
        (self.reload)(LevelFilter::from_level(level))?;
        info!("Log level set to {}", level);
        Ok(level)
    }
}

pub fn init() -> Result<LogLevelHandle, LoggingError> {
    let builder = FmtSubscriber::builder()
        .with_max_level(LevelFilter::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .with_filter_reloading();
    let handle = builder.reload_handle();
    builder
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(LogLevelHandle {
        reload: Box::new(move |filter| handle.reload(filter)),
    })
}
