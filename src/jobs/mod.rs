//! Scheduled Jobs
//!
//! Periodic maintenance for hosts that want it. Nothing in the subsystem
//! depends on these running; purge is safe to call at any time.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::interval;

use crate::confirm_code::ConfirmCodeManager;
use crate::receipt::{ReceiptError, ReceiptManager};

// =========================================================================
// Receipt Purge Job
// =========================================================================

/// Delete receipts that expired before now
pub async fn purge_expired_receipts(receipts: &ReceiptManager) -> Result<u64, JobError> {
    Ok(receipts.purge().await?)
}

// =========================================================================
// Confirm Code Sweep Job
// =========================================================================

/// Drop confirm codes that expired without being looked up again
pub fn sweep_expired_codes(codes: &ConfirmCodeManager) -> usize {
    codes.sweep_expired()
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for the purge scheduler
#[derive(Debug, Clone)]
pub struct PurgeSchedulerConfig {
    /// Interval for receipt purge (default: 5 minutes)
    pub receipt_purge_interval: Duration,
    /// Interval for confirm code sweep (default: 1 minute)
    pub code_sweep_interval: Duration,
}

impl Default for PurgeSchedulerConfig {
    fn default() -> Self {
        Self {
            receipt_purge_interval: Duration::from_secs(300),
            code_sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Runs purge and sweep on their own intervals
pub struct PurgeScheduler {
    receipts: Arc<ReceiptManager>,
    codes: Option<Arc<ConfirmCodeManager>>,
    config: PurgeSchedulerConfig,
}

impl PurgeScheduler {
    pub fn new(receipts: Arc<ReceiptManager>) -> Self {
        Self {
            receipts,
            codes: None,
            config: PurgeSchedulerConfig::default(),
        }
    }

    /// Also sweep the given confirm code manager
    pub fn with_codes(mut self, codes: Arc<ConfirmCodeManager>) -> Self {
        self.codes = Some(codes);
        self
    }

    pub fn with_config(mut self, config: PurgeSchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Start the scheduler in the background.
    /// Abort the returned handle to stop it.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        tracing::info!("Purge scheduler started");

        let mut purge_interval = interval(self.config.receipt_purge_interval);
        let mut sweep_interval = interval(self.config.code_sweep_interval);

        loop {
            tokio::select! {
                _ = purge_interval.tick() => {
                    match purge_expired_receipts(&self.receipts).await {
                        Ok(_) => {}
                        Err(JobError::Receipt(ReceiptError::Disposed)) => {
                            tracing::info!("Receipt system disposed, purge scheduler stopping");
                            return;
                        }
                        Err(e) => tracing::error!(error = %e, "Receipt purge failed"),
                    }
                }
                _ = sweep_interval.tick() => {
                    if let Some(codes) = &self.codes {
                        sweep_expired_codes(codes);
                    }
                }
            }
        }
    }

    /// Run every job once (for manual trigger or testing)
    pub async fn run_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match purge_expired_receipts(&self.receipts).await {
            Ok(count) => report.receipts_purged = count,
            Err(e) => report.errors.push(format!("Receipt purge: {}", e)),
        }

        if let Some(codes) = &self.codes {
            report.codes_swept = sweep_expired_codes(codes);
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub receipts_purged: u64,
    pub codes_swept: usize,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Receipt error: {0}")]
    Receipt(#[from] ReceiptError),
}

// =========================================================================
// Tests
// =========================================================================
