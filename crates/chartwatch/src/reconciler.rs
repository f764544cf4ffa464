//! Applies snapshots to storage.
//!
//! The static table is replaced wholesale; the dynamic table is upserted one
//! row per record. Every operation runs in a single transaction and rolls back
//! on the first failed statement.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::storage::{Statement, StorageGateway};
use crate::types::{AppRecord, TrackerResult};

/// Format of the dynamic table's `timestamp` column (UTC).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Format an observation time the way the dynamic table stores it.
pub fn format_timestamp(observed_at: DateTime<Utc>) -> String {
    observed_at.format(TIMESTAMP_FORMAT).to_string()
}

/// Writes snapshots through a [`StorageGateway`].
pub struct Reconciler<G> {
    gateway: G,
}

impl<G: StorageGateway> Reconciler<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn into_inner(self) -> G {
        self.gateway
    }

    /// Make the static table hold exactly `records`.
    pub fn replace_static(&mut self, records: &[AppRecord]) -> TrackerResult<usize> {
        let written = self.in_transaction(|gateway| {
            gateway.execute(Statement::ClearStatic, &[])?;
            for record in records {
                gateway.execute(
                    Statement::InsertStatic,
                    &[
                        record.id.as_str(),
                        record.name.as_str(),
                        record.url.as_str(),
                        record.image_url.as_str(),
                    ],
                )?;
            }
            Ok(records.len())
        })?;
        info!("Static table replaced with {written} rows");
        Ok(written)
    }

    /// Record one price observation per record at `observed_at`.
    pub fn upsert_dynamic(
        &mut self,
        records: &[AppRecord],
        observed_at: DateTime<Utc>,
    ) -> TrackerResult<usize> {
        let timestamp = format_timestamp(observed_at);
        let written = self.in_transaction(|gateway| {
            for record in records {
                gateway.execute(
                    Statement::ReplaceDynamic,
                    &[record.id.as_str(), record.price.as_str(), timestamp.as_str()],
                )?;
            }
            Ok(records.len())
        })?;
        info!("Dynamic table upserted {written} observations at {timestamp}");
        Ok(written)
    }

    /// Remove every dynamic row.
    pub fn clear_dynamic(&mut self) -> TrackerResult<usize> {
        let removed = self.in_transaction(|gateway| gateway.execute(Statement::ClearDynamic, &[]))?;
        info!("Dynamic table cleared ({removed} rows)");
        Ok(removed)
    }

    fn in_transaction<T>(
        &mut self,
        work: impl FnOnce(&mut G) -> TrackerResult<T>,
    ) -> TrackerResult<T> {
        self.gateway.begin()?;
        match work(&mut self.gateway) {
            Ok(value) => {
                self.gateway.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.gateway.rollback() {
                    warn!("Rollback failed after {e}: {rollback}");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DynamicKeying, SqliteGateway};
    use crate::types::TrackerError;
    use chrono::TimeZone;

    fn record(id: &str, price: &str) -> AppRecord {
        AppRecord {
            id: id.to_string(),
            name: format!("App {id}"),
            url: format!("https://play.google.com/store/apps/details?id={id}"),
            image_url: format!("https://img/{id}.png"),
            price: price.to_string(),
        }
    }

    fn reconciler(keying: DynamicKeying) -> Reconciler<SqliteGateway> {
        Reconciler::new(SqliteGateway::open_in_memory(keying).unwrap())
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, 11, 12, minute, 0).unwrap()
    }

    #[test]
    fn test_replace_static_never_leaves_a_superset() {
        let mut r = reconciler(DynamicKeying::LatestOnly);
        r.replace_static(&[record("com.old", "1.00")]).unwrap();
        r.replace_static(&[]).unwrap();
        assert!(r.gateway().static_rows().unwrap().is_empty());

        r.replace_static(&[record("com.a", "1.00"), record("com.b", "2.00")])
            .unwrap();
        let rows = r.gateway().static_rows().unwrap();
        let ids: Vec<&str> = rows.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(ids, vec!["com.a", "com.b"]);
        assert_eq!(rows[0].name, "App com.a");
        assert_eq!(rows[0].image_url, "https://img/com.a.png");
    }

    #[test]
    fn test_replace_static_rolls_back_on_failure() {
        let mut r = reconciler(DynamicKeying::LatestOnly);
        r.replace_static(&[record("com.keep", "1.00")]).unwrap();

        // The duplicate key violates the primary key mid-batch.
        let err = r
            .replace_static(&[record("com.a", "1.00"), record("com.a", "2.00")])
            .unwrap_err();
        assert!(matches!(err, TrackerError::Storage(_)));

        let rows = r.gateway().static_rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "com.keep");
    }

    #[test]
    fn test_upsert_dynamic_keeps_only_latest_observation() {
        let mut r = reconciler(DynamicKeying::LatestOnly);
        r.upsert_dynamic(&[record("com.a", "4.99")], at(0)).unwrap();
        r.upsert_dynamic(&[record("com.a", "2.99")], at(5)).unwrap();

        // Price history is lost: only the most recent row per id survives.
        let rows = r.gateway().dynamic_rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "com.a");
        assert_eq!(rows[0].price, "2.99");
        assert_eq!(rows[0].timestamp, "2021-01-11 12:05:00.000000");
    }

    #[test]
    fn test_upsert_dynamic_with_history_keying_accumulates() {
        let mut r = reconciler(DynamicKeying::History);
        r.upsert_dynamic(&[record("com.a", "4.99")], at(0)).unwrap();
        r.upsert_dynamic(&[record("com.a", "2.99")], at(5)).unwrap();

        let rows = r.gateway().dynamic_rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].price, "4.99");
        assert_eq!(rows[1].price, "2.99");
    }

    #[test]
    fn test_upsert_does_not_clear_other_ids() {
        let mut r = reconciler(DynamicKeying::LatestOnly);
        r.upsert_dynamic(&[record("com.a", "1.00"), record("com.b", "0")], at(0))
            .unwrap();
        r.upsert_dynamic(&[record("com.b", "3.00")], at(5)).unwrap();

        let rows = r.gateway().dynamic_rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].price, "1.00");
        assert_eq!(rows[1].price, "3.00");
    }

    #[test]
    fn test_clear_dynamic() {
        let mut r = reconciler(DynamicKeying::LatestOnly);
        r.upsert_dynamic(&[record("com.a", "1.00"), record("com.b", "2.00")], at(0))
            .unwrap();
        assert_eq!(r.clear_dynamic().unwrap(), 2);
        assert!(r.gateway().dynamic_rows().unwrap().is_empty());
    }
}
