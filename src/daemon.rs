//! Long-running sweep scheduler.
//!
//! The reminder sweep and the status sweep each get their own task and their
//! own cron schedule, so a slow tick of one never delays the other. A failed
//! tick is logged and the loop waits for the next fire time as usual.

use crate::error::{Result, SchedulerError};
use crate::service::SchedulerService;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;

/// Every minute, on the minute.
pub const DEFAULT_SCHEDULE: &str = "* * * * *";

/// The `cron` crate wants a seconds field. Five-field expressions get `0` prepended.
fn normalize_cron_expression(expr: &str) -> String {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() == 5 {
        format!("0 {}", expr.trim())
    } else {
        expr.trim().to_string()
    }
}

pub fn parse_schedule(expr: &str) -> Result<Schedule> {
    Schedule::from_str(&normalize_cron_expression(expr)).map_err(|e| {
        SchedulerError::validation("schedule", format!("invalid cron expression '{}': {}", expr, e))
    })
}

/// Time to wait from `now` until the schedule next fires.
pub fn next_delay(schedule: &Schedule, now: DateTime<Utc>) -> Option<std::time::Duration> {
    let next = schedule.after(&now).next()?;
    (next - now).to_std().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sweep {
    Reminders,
    Status,
}

impl Sweep {
    pub async fn run(self, service: &SchedulerService, now: DateTime<Utc>) -> Result<usize> {
        match self {
            Self::Reminders => service.run_reminder_sweep(now).await,
            Self::Status => service.run_status_sweep(now).await,
        }
    }
}

impl fmt::Display for Sweep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reminders => write!(f, "reminders"),
            Self::Status => write!(f, "status"),
        }
    }
}

pub struct SweepScheduler {
    service: Arc<SchedulerService>,
    reminder_schedule: Schedule,
    status_schedule: Schedule,
}

impl SweepScheduler {
    pub fn new(service: Arc<SchedulerService>, reminder_expr: &str, status_expr: &str) -> Result<Self> {
        Ok(Self {
            service,
            reminder_schedule: parse_schedule(reminder_expr)?,
            status_schedule: parse_schedule(status_expr)?,
        })
    }

    /// Run both sweeps until `shutdown` flips to true.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        tracing::info!("Sweep scheduler started");
        let reminders = tokio::spawn(run_loop(
            Arc::clone(&self.service),
            Sweep::Reminders,
            self.reminder_schedule,
            shutdown.clone(),
        ));
        let status = tokio::spawn(run_loop(
            Arc::clone(&self.service),
            Sweep::Status,
            self.status_schedule,
            shutdown,
        ));

        for (sweep, handle) in [(Sweep::Reminders, reminders), (Sweep::Status, status)] {
            if let Err(e) = handle.await {
                tracing::error!(sweep = %sweep, "Sweep task ended abnormally: {}", e);
            }
        }
        tracing::info!("Sweep scheduler stopped");
    }
}

async fn run_loop(
    service: Arc<SchedulerService>,
    sweep: Sweep,
    schedule: Schedule,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        let Some(delay) = next_delay(&schedule, Utc::now()) else {
            tracing::warn!(sweep = %sweep, "Schedule has no future fire times, stopping");
            break;
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        let now = Utc::now();
        match sweep.run(&service, now).await {
            Ok(0) => tracing::debug!(sweep = %sweep, "Tick finished with nothing to do"),
            Ok(count) => tracing::info!(sweep = %sweep, count, "Tick finished"),
            Err(e) => tracing::warn!(sweep = %sweep, "Tick failed: {}", e),
        }
    }
    tracing::debug!(sweep = %sweep, "Sweep loop exited");
}

/// A receiver that turns true on Ctrl-C or SIGTERM.
pub fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    tracing::error!("Failed to listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
            _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
        }

        let _ = tx.send(true);
    });

    rx
}
