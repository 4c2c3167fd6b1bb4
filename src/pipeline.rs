//! Runs every work unit through paginate -> normalize and gathers the results.
//!
//! A failing unit never takes the others down with it: its error is recorded
//! in the `RunSummary` and the remaining units carry on. The one exception is
//! credentials. The first auth rejection in a run triggers a single credential
//! refresh shared by all workers; once credentials are known to be dead, units
//! that have not started yet fail fast instead of hitting the remote again.

use crate::model::{
    FetchError, FetchRequest, FetchResult, NormalizedRecord, RunReport, RunSummary, UnitError,
    UnitFailure, UnitStats, WorkUnit,
};
use crate::normalizer::normalize_all;
use crate::paginator::Paginator;
use crate::scraper::Source;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout_at};
use tracing::{error, info, warn};

#[derive(Debug, Default)]
struct RefreshState {
    attempted: bool,
    refreshed: bool,
}

pub struct Pipeline {
    source: Arc<dyn Source>,
    paginator: Paginator,
    page_size: u32,
    concurrency: usize,
    deadline: Option<Duration>,
    refresh: Mutex<RefreshState>,
    credentials_dead: AtomicBool,
}

struct UnitOutput {
    records: Vec<NormalizedRecord>,
    stats: UnitStats,
}

impl Pipeline {
    pub fn new(source: Arc<dyn Source>, paginator: Paginator, page_size: u32) -> Self {
        Self {
            source,
            paginator,
            page_size: page_size.max(1),
            concurrency: 1,
            deadline: None,
            refresh: Mutex::new(RefreshState::default()),
            credentials_dead: AtomicBool::new(false),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub async fn run(&self, units: Vec<WorkUnit>) -> RunReport {
        let deadline = self.deadline.map(|d| Instant::now() + d);
        info!(
            "Running {} work unit(s) with concurrency {}",
            units.len(),
            self.concurrency
        );

        let outcomes: Vec<(String, Result<UnitOutput, UnitError>)> = stream::iter(units)
            .map(|unit| async move {
                let outcome = match deadline {
                    Some(at) if Instant::now() >= at => Err(UnitError::DeadlineExceeded),
                    Some(at) => timeout_at(at, self.run_unit(&unit))
                        .await
                        .unwrap_or(Err(UnitError::DeadlineExceeded)),
                    None => self.run_unit(&unit).await,
                };
                (unit.key, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut result = FetchResult::default();
        let mut summary = RunSummary::default();
        for (key, outcome) in outcomes {
            match outcome {
                Ok(output) => {
                    result.insert(key, output.records);
                    summary.succeeded.push(output.stats);
                }
                Err(error) => {
                    warn!("Unit '{}' failed: {}", key, error);
                    summary.failed.push(UnitFailure { key, error });
                }
            }
        }
        summary.succeeded.sort_by(|a, b| a.key.cmp(&b.key));
        summary.failed.sort_by(|a, b| a.key.cmp(&b.key));

        RunReport { result, summary }
    }

    async fn run_unit(&self, unit: &WorkUnit) -> Result<UnitOutput, UnitError> {
        if self.credentials_dead.load(Ordering::SeqCst) {
            return Err(UnitError::CredentialsRejected);
        }
        info!("Fetching '{}'", unit.key);

        match self.fetch_unit(unit).await {
            Err(e) if e.is_auth() => {
                if !self.refresh_once().await {
                    self.credentials_dead.store(true, Ordering::SeqCst);
                    return Err(e.into());
                }
                info!("Retrying '{}' with refreshed credentials", unit.key);
                self.fetch_unit(unit).await.map_err(|e| {
                    if e.is_auth() {
                        error!(
                            "Credentials rejected again after refresh; skipping remaining units"
                        );
                        self.credentials_dead.store(true, Ordering::SeqCst);
                    }
                    UnitError::from(e)
                })
            }
            other => other.map_err(UnitError::from),
        }
    }

    async fn fetch_unit(&self, unit: &WorkUnit) -> Result<UnitOutput, FetchError> {
        let base = FetchRequest::new(
            self.source.endpoint(),
            &unit.term,
            unit.context.as_deref(),
            self.page_size,
        );
        let raw = self.paginator.fetch_all(self.source.as_ref(), &base).await?;
        let (records, dropped) = normalize_all(self.source.shape(), &raw, Utc::now());

        info!(
            "'{}': {} fetched, {} kept, {} dropped",
            unit.key,
            raw.len(),
            records.len(),
            dropped
        );
        Ok(UnitOutput {
            stats: UnitStats {
                key: unit.key.clone(),
                fetched: raw.len(),
                kept: records.len(),
                dropped,
            },
            records,
        })
    }

    /// At most one refresh per run. Later callers get the outcome of the first.
    async fn refresh_once(&self) -> bool {
        let mut state = self.refresh.lock().await;
        if state.attempted {
            return state.refreshed;
        }
        state.attempted = true;
        state.refreshed = match self.source.refresh_credentials().await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                error!("Credential refresh failed: {}", e);
                false
            }
        };
        state.refreshed
    }
}
