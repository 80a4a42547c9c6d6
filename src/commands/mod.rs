pub mod catalog;
pub mod completion;
pub mod config;
pub mod schedule;
pub mod sweep;

use crate::catalog::CatalogStore;
use crate::config::Context;
use crate::meeting::ZoomClient;
use crate::notify::{Notifier, WebhookDispatcher};
use crate::service::SchedulerService;
use crate::store::FileStore;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

/// Wire the service to the data directory and the configured outside services.
pub fn build_service(ctx: &Context) -> Result<SchedulerService> {
    let data_dir = ctx.data_dir()?;
    tracing::debug!(data_dir = %data_dir.display(), "Opening data directory");

    let catalog = CatalogStore::new(&data_dir).load()?;
    let store = Arc::new(FileStore::new(&data_dir));
    let meetings = Arc::new(ZoomClient::new(
        &ctx.meeting_url(),
        ctx.meeting_token(),
        ctx.config.meeting.timeout_secs,
    )?);

    let webhook_url = ctx.webhook_url();
    let mail_webhook_url = ctx.mail_webhook_url();
    let notifier = if webhook_url.is_none() && mail_webhook_url.is_none() {
        Notifier::logging()
    } else {
        let dispatcher = Arc::new(WebhookDispatcher::new(
            webhook_url,
            mail_webhook_url,
            ctx.config.notify.timeout_ms,
        )?);
        let sink: Arc<WebhookDispatcher> = Arc::clone(&dispatcher);
        Notifier::new(sink, dispatcher)
    };

    Ok(SchedulerService::new(store, catalog, meetings, notifier)
        .with_default_timezone(ctx.config.default_timezone.clone()))
}

/// Whether stderr is a terminal, so spinners and prompts make sense.
pub fn is_interactive() -> bool {
    atty::is(atty::Stream::Stderr)
}

/// Create a spinner for long-running operations. Hidden when not on a terminal.
pub fn create_spinner(message: &str) -> ProgressBar {
    if !is_interactive() {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .expect("Invalid spinner template"),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}
