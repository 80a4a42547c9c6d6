use crate::cli::OutputFormat;
use crate::config::{Config, Context};
use crate::error::SchedulerError;
use crate::output::{print_info, print_json, print_success, print_yaml};
use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

/// Config file contents plus the values actually in effect after env overrides.
#[derive(Serialize)]
struct EffectiveConfig<'a> {
    config_path: PathBuf,
    effective_data_dir: PathBuf,
    meeting_api_url: String,
    meeting_token_set: bool,
    webhook_url: Option<String>,
    #[serde(flatten)]
    config: &'a Config,
}

pub fn show(ctx: &Context) -> Result<()> {
    let mut config = ctx.config.clone();
    // Never print the secret itself
    if config.meeting.access_token.is_some() {
        config.meeting.access_token = Some("********".to_string());
    }
    let effective = EffectiveConfig {
        config_path: ctx.config_path().to_path_buf(),
        effective_data_dir: ctx.data_dir()?,
        meeting_api_url: ctx.meeting_url(),
        meeting_token_set: ctx.meeting_token().is_some(),
        webhook_url: ctx.webhook_url(),
        config: &config,
    };

    match ctx.output_format() {
        OutputFormat::Json => print_json(&effective),
        OutputFormat::Table | OutputFormat::Yaml => print_yaml(&effective),
    }
}

/// Write the defaults to the config path. Refuses to overwrite unless `force`.
pub fn init(ctx: &Context, force: bool) -> Result<()> {
    let path = ctx.config_path();
    if path.exists() && !force {
        print_info(&format!("Config already exists at {}", path.display()));
        return Err(SchedulerError::validation("force", "pass --force to overwrite").into());
    }
    Config::default().save_to_path(path)?;
    print_success(&format!("Wrote default config to {}", path.display()));
    Ok(())
}
