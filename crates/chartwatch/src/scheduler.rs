//! Bootstrap-then-observe driver.
//!
//! `Bootstrap` runs once: load the chart, scroll until every item is rendered,
//! optionally reset the dynamic table, and replace the static table.
//! `Observe` repeats forever: extract, upsert prices with the current UTC time,
//! sleep. Any fatal error ends the loop and is returned to the caller.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::extractor::SnapshotExtractor;
use crate::page::PageContentProvider;
use crate::readiness::{scroll_to_completion, ReadinessPolicy};
use crate::reconciler::Reconciler;
use crate::storage::StorageGateway;
use crate::types::{Snapshot, TrackerResult};

/// Default delay between observation cycles (5 minutes).
pub const DEFAULT_LOOP_DELAY: Duration = Duration::from_secs(300);

/// State of the scheduler. The only transition is `Bootstrap` → `Observe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Bootstrap,
    Observe,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub storefront_url: String,
    pub loop_delay: Duration,
    pub readiness: ReadinessPolicy,
    /// Clear the dynamic table during bootstrap.
    pub reset_dynamic: bool,
}

/// What the bootstrap cycle did.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapReport {
    pub scroll_iterations: u32,
    pub static_rows: usize,
    pub dropped: usize,
    /// Rows removed from the dynamic table, when it was reset.
    pub dynamic_cleared: Option<usize>,
}

/// Owns the page session and the storage handle for the process lifetime.
pub struct Scheduler<P, G> {
    page: P,
    reconciler: Reconciler<G>,
    extractor: SnapshotExtractor,
    config: SchedulerConfig,
    phase: Phase,
    cycles: u64,
}

impl<P, G> Scheduler<P, G>
where
    P: PageContentProvider,
    G: StorageGateway,
{
    pub fn new(
        page: P,
        reconciler: Reconciler<G>,
        extractor: SnapshotExtractor,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            page,
            reconciler,
            extractor,
            config,
            phase: Phase::Bootstrap,
            cycles: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of completed observation cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn page_mut(&mut self) -> &mut P {
        &mut self.page
    }

    pub fn reconciler(&self) -> &Reconciler<G> {
        &self.reconciler
    }

    /// Hand back the session and storage handles so the caller can close them.
    pub fn into_parts(self) -> (P, Reconciler<G>) {
        (self.page, self.reconciler)
    }

    /// Run the bootstrap cycle and move to `Observe`.
    pub async fn bootstrap(&mut self) -> TrackerResult<BootstrapReport> {
        info!("Bootstrap: loading {}", self.config.storefront_url);
        self.page.navigate(&self.config.storefront_url).await?;
        let scroll_iterations = scroll_to_completion(&mut self.page, &self.config.readiness).await?;

        let dynamic_cleared = if self.config.reset_dynamic {
            Some(self.reconciler.clear_dynamic()?)
        } else {
            None
        };

        let snapshot = self.populate_static_table().await?;
        self.phase = Phase::Observe;

        let report = BootstrapReport {
            scroll_iterations,
            static_rows: snapshot.records.len(),
            dropped: snapshot.dropped.len(),
            dynamic_cleared,
        };
        info!(
            "Bootstrap complete after {} scrolls: {} static rows, {} dropped",
            report.scroll_iterations, report.static_rows, report.dropped
        );
        Ok(report)
    }

    /// Extract the current page and make it the static table's contents.
    pub async fn populate_static_table(&mut self) -> TrackerResult<Snapshot> {
        let snapshot = self.extractor.extract(&mut self.page).await?;
        self.reconciler.replace_static(&snapshot.records)?;
        Ok(snapshot)
    }

    /// Extract the current page and record one price observation per item.
    pub async fn populate_dynamic_table(&mut self) -> TrackerResult<Snapshot> {
        let snapshot = self.extractor.extract(&mut self.page).await?;
        self.reconciler.upsert_dynamic(&snapshot.records, Utc::now())?;
        Ok(snapshot)
    }

    /// Run one observation cycle without the trailing delay.
    pub async fn observe(&mut self) -> TrackerResult<Snapshot> {
        let snapshot = self.populate_dynamic_table().await?;
        self.cycles += 1;
        info!("Observation cycle {} recorded {} prices", self.cycles, snapshot.len());
        Ok(snapshot)
    }

    /// Advance the state machine by one action and report the phase it ran.
    pub async fn step(&mut self) -> TrackerResult<Phase> {
        let phase = self.phase;
        match phase {
            Phase::Bootstrap => {
                self.bootstrap().await?;
            }
            Phase::Observe => {
                self.observe().await?;
            }
        }
        Ok(phase)
    }

    /// Bootstrap if needed, then observe forever.
    ///
    /// Only returns on a fatal error.
    pub async fn run(&mut self) -> TrackerResult<()> {
        loop {
            if self.step().await? == Phase::Observe {
                tokio::time::sleep(self.config.loop_delay).await;
            }
        }
    }
}
