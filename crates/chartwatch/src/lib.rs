//! Chartwatch: storefront top-chart extraction and price reconciliation.
//!
//! A rendered chart page is read through a [`PageContentProvider`], turned into
//! a [`Snapshot`] of [`AppRecord`]s by the [`SnapshotExtractor`], and written to
//! the static and dynamic tables by the [`Reconciler`]. The [`Scheduler`] drives
//! one bootstrap cycle followed by periodic observation cycles.

pub mod extractor;
pub mod fields;
pub mod page;
pub mod readiness;
pub mod reconciler;
pub mod scheduler;
pub mod storage;
pub mod testing;
pub mod types;

pub use extractor::SnapshotExtractor;
pub use fields::{FieldMapping, FieldSpec, ReadMode, Selectors};
pub use page::{ElementHandle, PageContentProvider};
pub use readiness::{scroll_to_completion, ReadinessPolicy};
pub use reconciler::Reconciler;
pub use scheduler::{Phase, Scheduler, SchedulerConfig};
pub use storage::{DynamicKeying, DynamicRow, SqliteGateway, Statement, StaticRow, StorageGateway};
pub use types::*;
