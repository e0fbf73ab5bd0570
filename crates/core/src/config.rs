use crate::clock::{Clock, DEFAULT_FIXED_TIME};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Directory holding one `<table>.json` file per table.
    pub data_dir: PathBuf,
    /// Persist mutated tables after a successful invocation.
    #[serde(default)]
    pub write_back: bool,
    pub clock: ClockConfig,
    pub log: LogConfig,
    /// Tools callable through the dispatcher. `*` allows everything.
    #[serde(default = "default_allowed_tools")]
    pub allowed_tools: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClockMode {
    Fixed,
    System,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClockConfig {
    pub mode: ClockMode,
    pub fixed_time: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LogConfig {
    pub dir: Option<PathBuf>,
    pub audit: bool,
}

fn default_allowed_tools() -> Vec<String> {
    vec!["*".to_string()]
}

impl ClockConfig {
    pub fn build(&self) -> Result<Clock, ConfigError> {
        match self.mode {
            ClockMode::System => Ok(Clock::System),
            ClockMode::Fixed => Clock::fixed(&self.fixed_time).ok_or_else(|| {
                ConfigError::Message(format!(
                    "clock.fixed_time must be YYYY-MM-DDTHH:MM:SS, got '{}'",
                    self.fixed_time
                ))
            }),
        }
    }
}

impl AppConfig {
    /// Defaults, then `~/.opsdesk/config.*` (or `custom_path`), then `OPSDESK_*` variables.
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let base = PathBuf::from(home).join(".opsdesk");

        let mut builder = Config::builder()
            .set_default("data_dir", base.join("data").to_string_lossy().to_string())?
            .set_default("write_back", false)?
            .set_default("clock.mode", "fixed")?
            .set_default("clock.fixed_time", DEFAULT_FIXED_TIME)?
            .set_default("log.audit", true)?
            .set_default("allowed_tools", vec!["*"])?;

        builder = match custom_path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::from(base.join("config")).required(false)),
        };

        let s = builder
            // OPSDESK_DATA_DIR, OPSDESK_CLOCK__MODE, ...
            .add_source(Environment::with_prefix("OPSDESK").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
