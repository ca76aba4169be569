//! In-memory state stores.
//!
//! A state store is one domain's database for a single run: a set of
//! independently keyed [`Table`]s serialized as one document with a
//! top-level key per table. It is created from a snapshot at reset, mutated
//! only through WRITE toolkit operations, and discarded at run end.

mod ids;
mod table;

pub use ids::IdAllocator;
pub use table::Table;

use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{BenchError, BenchResult, EnvironmentError};

/// Summary counters for a store (entity counts, totals).
pub type Statistics = BTreeMap<String, serde_json::Value>;

/// A domain database.
///
/// Implementations are plain data records whose fields are [`Table`]s (or
/// other ordered collections) so that serialization is canonical.
pub trait Database: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Summary statistics for reporting.
    fn statistics(&self) -> Statistics;
}

/// Decodes a store from a snapshot document.
pub fn from_snapshot<D: Database>(snapshot: &serde_json::Value) -> Result<D, EnvironmentError> {
    D::deserialize(snapshot).map_err(|e| EnvironmentError::InvalidSnapshot {
        message: e.to_string(),
    })
}

/// Decodes a store from snapshot JSON text.
pub fn from_snapshot_str<D: Database>(json: &str) -> Result<D, EnvironmentError> {
    serde_json::from_str(json).map_err(|e| EnvironmentError::InvalidSnapshot {
        message: e.to_string(),
    })
}

/// Loads a store from a snapshot file.
pub fn from_snapshot_file<D: Database>(path: impl AsRef<Path>) -> BenchResult<D> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| BenchError::io(format!("read snapshot {}: {e}", path.display())))?;
    Ok(from_snapshot_str(&text)?)
}

/// Encodes a store as a snapshot document.
pub fn to_snapshot<D: Serialize>(db: &D) -> BenchResult<serde_json::Value> {
    serde_json::to_value(db).map_err(|e| BenchError::internal(format!("serialize store: {e}")))
}

/// Hex blake3 digest of the store's canonical JSON encoding.
///
/// Two stores have the same fingerprint exactly when their serialized
/// contents are identical.
pub fn fingerprint<D: Serialize>(db: &D) -> BenchResult<String> {
    let bytes =
        serde_json::to_vec(db).map_err(|e| BenchError::internal(format!("serialize store: {e}")))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct CounterDb {
        counters: Table<i64>,
    }

    impl Database for CounterDb {
        fn statistics(&self) -> Statistics {
            let mut stats = Statistics::new();
            stats.insert("num_counters".to_string(), self.counters.len().into());
            stats.insert("total".to_string(), self.counters.values().sum::<i64>().into());
            stats
        }
    }

    #[test]
    fn snapshot_roundtrip_keeps_fingerprint() {
        let db: CounterDb =
            from_snapshot(&serde_json::json!({"counters": {"a": 1, "b": 2}})).unwrap();
        let stats = db.statistics();
        assert_eq!(stats["num_counters"], 2);
        assert_eq!(stats["total"], 3);

        let snapshot = to_snapshot(&db).unwrap();
        let again: CounterDb = from_snapshot(&snapshot).unwrap();
        assert_eq!(fingerprint(&db).unwrap(), fingerprint(&again).unwrap());
    }

    #[test]
    fn fingerprint_tracks_content() {
        let mut db: CounterDb = from_snapshot_str(r#"{"counters": {"a": 1}}"#).unwrap();
        let before = fingerprint(&db).unwrap();
        db.counters.insert_fresh("b", 5);
        assert_ne!(before, fingerprint(&db).unwrap());
    }

    #[test]
    fn invalid_snapshot_is_reported() {
        let err = from_snapshot::<CounterDb>(&serde_json::json!({"counters": 3})).unwrap_err();
        assert!(matches!(err, EnvironmentError::InvalidSnapshot { .. }));
    }

    #[test]
    fn loads_snapshot_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"counters": {{"x": 7}}}}"#).unwrap();
        let db: CounterDb = from_snapshot_file(file.path()).unwrap();
        assert_eq!(db.counters.get("x"), Some(&7));

        let missing = from_snapshot_file::<CounterDb>("/nonexistent/snapshot.json");
        assert!(missing.is_err());
    }
}
