use crate::cli::OutputFormat;
use crate::daemon::DEFAULT_SCHEDULE;
use crate::error::SchedulerError;
use crate::notify::DEFAULT_TIMEOUT_MS;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// Build-time default injected via build.rs (MEETING_API_URL)
const DEFAULT_MEETING_API_URL: &str = env!("MEETING_API_URL");

const DEFAULT_MEETING_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingConfig {
    #[serde(default = "default_meeting_api_url")]
    pub api_url: String,

    pub access_token: Option<String>,

    #[serde(default = "default_meeting_timeout")]
    pub timeout_secs: u64,
}

impl Default for MeetingConfig {
    fn default() -> Self {
        Self {
            api_url: default_meeting_api_url(),
            access_token: None,
            timeout_secs: DEFAULT_MEETING_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// In-app notifications are POSTed here.
    pub webhook_url: Option<String>,

    /// Email and SMS requests are POSTed here.
    pub mail_webhook_url: Option<String>,

    #[serde(default = "default_notify_timeout")]
    pub timeout_ms: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            mail_webhook_url: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where calls.json and catalog.json live. Platform data dir when unset.
    pub data_dir: Option<PathBuf>,

    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    #[serde(default = "default_schedule")]
    pub reminder_schedule: String,

    #[serde(default = "default_schedule")]
    pub status_schedule: String,

    #[serde(default)]
    pub meeting: MeetingConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default = "default_format")]
    pub format: String,

    #[serde(default = "default_true")]
    pub color: bool,
}

fn default_meeting_api_url() -> String {
    DEFAULT_MEETING_API_URL.to_string()
}

fn default_meeting_timeout() -> u64 {
    DEFAULT_MEETING_TIMEOUT_SECS
}

fn default_notify_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_schedule() -> String {
    DEFAULT_SCHEDULE.to_string()
}

fn default_format() -> String {
    "table".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            default_timezone: default_timezone(),
            reminder_schedule: default_schedule(),
            status_schedule: default_schedule(),
            meeting: MeetingConfig::default(),
            notify: NotifyConfig::default(),
            format: default_format(),
            color: true,
        }
    }
}

fn project_dirs() -> Result<ProjectDirs, SchedulerError> {
    ProjectDirs::from("com", "tutorcall", "tutorcall")
        .ok_or_else(|| SchedulerError::Other("Could not determine config directory".to_string()))
}

impl Config {
    pub fn path() -> Result<PathBuf, SchedulerError> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    pub fn default_data_dir() -> Result<PathBuf, SchedulerError> {
        Ok(project_dirs()?.data_dir().to_path_buf())
    }

    pub fn load_from_path(path: &Path) -> Result<Self, SchedulerError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(SchedulerError::ConfigRead)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), SchedulerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(SchedulerError::ConfigWrite)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(SchedulerError::ConfigWrite)?;
        Ok(())
    }
}

/// Runtime context: config file plus environment and CLI overrides
#[derive(Debug)]
pub struct Context {
    pub config: Config,
    config_path: PathBuf,
    data_dir_override: Option<PathBuf>,
    format_override: Option<OutputFormat>,
}

impl Context {
    /// Load from `config_path`, or the platform config file when `None`.
    pub fn load(config_path: Option<&Path>) -> Result<Self, SchedulerError> {
        let config_path = match config_path {
            Some(path) => path.to_path_buf(),
            None => Config::path()?,
        };
        let config = Config::load_from_path(&config_path)?;
        Ok(Self {
            config,
            config_path,
            data_dir_override: None,
            format_override: None,
        })
    }

    /// Create context with a specific config (for testing)
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            config_path: PathBuf::from("config.toml"),
            data_dir_override: None,
            format_override: None,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn set_data_dir(&mut self, dir: PathBuf) {
        self.data_dir_override = Some(dir);
    }

    pub fn set_format(&mut self, format: OutputFormat) {
        self.format_override = Some(format);
    }

    /// `--data-dir`, then `TUTORCALL_DATA_DIR`, then config, then the platform data dir.
    pub fn data_dir(&self) -> Result<PathBuf, SchedulerError> {
        if let Some(dir) = &self.data_dir_override {
            return Ok(dir.clone());
        }
        if let Ok(dir) = std::env::var("TUTORCALL_DATA_DIR") {
            return Ok(PathBuf::from(dir));
        }
        match &self.config.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Config::default_data_dir(),
        }
    }

    pub fn meeting_url(&self) -> String {
        std::env::var("TUTORCALL_MEETING_URL").unwrap_or_else(|_| self.config.meeting.api_url.clone())
    }

    pub fn meeting_token(&self) -> Option<String> {
        std::env::var("TUTORCALL_MEETING_TOKEN")
            .ok()
            .or_else(|| self.config.meeting.access_token.clone())
    }

    pub fn webhook_url(&self) -> Option<String> {
        std::env::var("TUTORCALL_WEBHOOK_URL")
            .ok()
            .or_else(|| self.config.notify.webhook_url.clone())
    }

    pub fn mail_webhook_url(&self) -> Option<String> {
        self.config.notify.mail_webhook_url.clone()
    }

    pub fn output_format(&self) -> OutputFormat {
        self.format_override.unwrap_or_else(|| {
            match self.config.format.to_lowercase().as_str() {
                "json" => OutputFormat::Json,
                "yaml" => OutputFormat::Yaml,
                _ => OutputFormat::Table,
            }
        })
    }

    pub fn save_config(&self) -> Result<(), SchedulerError> {
        self.config.save_to_path(&self.config_path)
    }
}
