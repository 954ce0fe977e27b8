//! Scheduled shift maintenance: close every profile's shift at the window
//! close boundary and reopen at the open boundary.
//!
//! Runs independently of in-flight receipts; the provider's shift state is
//! the only synchronization point. The scheduler evaluates cron in UTC, so
//! the Kyiv boundary times are converted once at startup.

use std::sync::Arc;

use anyhow::Result;
use chrono::{NaiveTime, Timelike, Utc};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::services::checkbox_service;
use crate::state::AppState;
use crate::time_window::KYIV_TZ;

pub struct ShiftMaintenanceService {
    scheduler: JobScheduler,
    state: Arc<AppState>,
}

impl ShiftMaintenanceService {
    pub async fn new(state: Arc<AppState>) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self { scheduler, state })
    }

    /// Registers both maintenance jobs and starts the scheduler.
    pub async fn start(&self) -> Result<()> {
        info!("Starting shift maintenance jobs...");

        let window = self.state.config.receipt_window.clone();
        self.add_close_job(window.close_at).await?;
        self.add_open_job(window.open_at).await?;

        self.scheduler.start().await?;
        info!(
            "Shift maintenance scheduler started (close {} / open {} Kyiv)",
            window.close_at.format("%H:%M"),
            window.open_at.format("%H:%M")
        );
        Ok(())
    }

    async fn add_close_job(&self, at: NaiveTime) -> Result<()> {
        let state = Arc::clone(&self.state);
        let cron = utc_cron_for_kyiv_time(at);

        let job = Job::new_async(cron.as_str(), move |_uuid, _l| {
            let state = Arc::clone(&state);
            Box::pin(async move {
                info!("shift_maintenance.close_all.start");
                close_all_shifts(&state).await;
            })
        })?;

        self.scheduler.add(job).await?;
        info!("Added shift close job (daily at {} Kyiv)", at.format("%H:%M"));
        Ok(())
    }

    async fn add_open_job(&self, at: NaiveTime) -> Result<()> {
        let state = Arc::clone(&self.state);
        let cron = utc_cron_for_kyiv_time(at);

        let job = Job::new_async(cron.as_str(), move |_uuid, _l| {
            let state = Arc::clone(&state);
            Box::pin(async move {
                info!("shift_maintenance.open_all.start");
                open_all_shifts(&state).await;
            })
        })?;

        self.scheduler.add(job).await?;
        info!("Added shift open job (daily at {} Kyiv)", at.format("%H:%M"));
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down shift maintenance jobs...");
        self.scheduler.shutdown().await?;
        Ok(())
    }
}

/// Six-field UTC cron for a daily Kyiv wall-clock time. The offset is the one
/// in effect at startup; a DST change shifts the boundary by an hour until
/// the next restart.
fn utc_cron_for_kyiv_time(at: NaiveTime) -> String {
    let today = Utc::now().with_timezone(&KYIV_TZ).date_naive();
    let local = today.and_time(at);
    let utc = match local.and_local_timezone(KYIV_TZ) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        chrono::LocalResult::None => local.and_utc(),
    };
    format!("0 {} {} * * *", utc.minute(), utc.hour())
}

/// Closes the shift for every configured profile, continuing past failures.
pub async fn close_all_shifts(state: &AppState) {
    for profile in &state.config.checkbox.profiles {
        let result = async {
            let token = checkbox_service::sign_in(state, profile).await?;
            checkbox_service::close_shift(state, &token, profile).await
        }
        .await;
        match result {
            Ok(_) => info!("shift_maintenance.close_ok profile_id={}", profile.id),
            Err(e) => error!(
                "shift_maintenance.close_error profile_id={} error={}",
                profile.id, e
            ),
        }
    }
}

/// Opens (or confirms open) the shift for every configured profile.
pub async fn open_all_shifts(state: &AppState) {
    for profile in &state.config.checkbox.profiles {
        let result = async {
            let token = checkbox_service::sign_in(state, profile).await?;
            checkbox_service::ensure_shift(state, &token, profile).await
        }
        .await;
        match result {
            Ok(()) => info!("shift_maintenance.open_ok profile_id={}", profile.id),
            Err(e) => error!(
                "shift_maintenance.open_error profile_id={} error={}",
                profile.id, e
            ),
        }
    }
}
