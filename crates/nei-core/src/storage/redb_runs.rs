//! # redb-backed Run Storage
//!
//! A disk-backed store of simulation runs using the redb embedded database.
//!
//! Runs are kept in the binary persistence format next to a small summary,
//! so listing a database never decodes full records.

use crate::export::canonical_checksum;
use crate::formats::{run_from_bytes, run_to_bytes};
use crate::primitives::MAX_LABEL_LENGTH;
use crate::{Element, NeiError, Simulation};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Table for runs: RunId(u64) -> persistence bytes
const RUNS: TableDefinition<u64, &[u8]> = TableDefinition::new("runs");

/// Table for summaries: RunId(u64) -> postcard RunSummary
const SUMMARIES: TableDefinition<u64, &[u8]> = TableDefinition::new("summaries");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_RUN_ID: &str = "next_run_id";

fn io_err(e: impl std::fmt::Display) -> NeiError {
    NeiError::IoError(e.to_string())
}

// =============================================================================
// RUN ID & SUMMARY
// =============================================================================

/// Identifier of a stored run. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What `list` reports about a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: RunId,
    pub label: Option<String>,
    pub elements: Vec<Element>,
    /// Recorded steps, including the initial state.
    pub steps: usize,
    pub time_start: f64,
    pub time_end: f64,
    pub final_temperature: f64,
    pub checksum: u64,
}

impl RunSummary {
    fn describe(id: RunId, label: Option<String>, run: &Simulation) -> Self {
        Self {
            id,
            label,
            elements: run.elements().collect(),
            steps: run.len(),
            time_start: run.time().first().map_or(0.0, |t| t.as_seconds()),
            time_end: run.time().last().map_or(0.0, |t| t.as_seconds()),
            final_temperature: run.temperature().last().map_or(0.0, |t| t.as_kelvin()),
            checksum: canonical_checksum(run),
        }
    }
}

// =============================================================================
// RUN STORE
// =============================================================================

/// A disk-backed collection of simulation runs.
pub struct RunStore {
    db: Database,
    next_run_id: u64,
}

impl std::fmt::Debug for RunStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunStore")
            .field("next_run_id", &self.next_run_id)
            .finish_non_exhaustive()
    }
}

impl RunStore {
    /// Open or create a run database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NeiError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        {
            let write_txn = db.begin_write().map_err(io_err)?;
            let _ = write_txn.open_table(RUNS).map_err(io_err)?;
            let _ = write_txn.open_table(SUMMARIES).map_err(io_err)?;
            let _ = write_txn.open_table(METADATA).map_err(io_err)?;
            write_txn.commit().map_err(io_err)?;
        }

        let next_run_id = {
            let read_txn = db.begin_read().map_err(io_err)?;
            let table = read_txn.open_table(METADATA).map_err(io_err)?;
            table
                .get(NEXT_RUN_ID)
                .map_err(io_err)?
                .map_or(1, |v| v.value())
        };

        Ok(Self { db, next_run_id })
    }

    /// Store a run under a fresh id.
    pub fn insert(&mut self, run: &Simulation, label: Option<&str>) -> Result<RunId, NeiError> {
        if let Some(label) = label
            && label.len() > MAX_LABEL_LENGTH
        {
            return Err(NeiError::InvalidParameter(format!(
                "label longer than {} bytes",
                MAX_LABEL_LENGTH
            )));
        }

        let id = RunId(self.next_run_id);
        let run_bytes = run_to_bytes(run)?;
        let summary = RunSummary::describe(id, label.map(str::to_string), run);
        let summary_bytes = postcard::to_stdvec(&summary)
            .map_err(|e| NeiError::SerializationError(e.to_string()))?;

        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut runs = write_txn.open_table(RUNS).map_err(io_err)?;
            runs.insert(id.0, run_bytes.as_slice()).map_err(io_err)?;
            let mut summaries = write_txn.open_table(SUMMARIES).map_err(io_err)?;
            summaries
                .insert(id.0, summary_bytes.as_slice())
                .map_err(io_err)?;
            let mut meta = write_txn.open_table(METADATA).map_err(io_err)?;
            meta.insert(NEXT_RUN_ID, id.0 + 1).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;

        self.next_run_id = id.0 + 1;
        Ok(id)
    }

    /// Load a run.
    pub fn get(&self, id: RunId) -> Result<Simulation, NeiError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(RUNS).map_err(io_err)?;
        let entry = table
            .get(id.0)
            .map_err(io_err)?
            .ok_or(NeiError::RunNotFound(id.0))?;
        run_from_bytes(entry.value())
    }

    /// Summary of one run.
    pub fn summary(&self, id: RunId) -> Result<RunSummary, NeiError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(SUMMARIES).map_err(io_err)?;
        let entry = table
            .get(id.0)
            .map_err(io_err)?
            .ok_or(NeiError::RunNotFound(id.0))?;
        decode_summary(entry.value())
    }

    /// Summaries of every run, oldest first.
    pub fn list(&self) -> Result<Vec<RunSummary>, NeiError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(SUMMARIES).map_err(io_err)?;
        let mut summaries = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            summaries.push(decode_summary(value.value())?);
        }
        Ok(summaries)
    }

    /// Delete a run.
    pub fn remove(&mut self, id: RunId) -> Result<(), NeiError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        let existed = {
            let mut runs = write_txn.open_table(RUNS).map_err(io_err)?;
            let existed = runs.remove(id.0).map_err(io_err)?.is_some();
            let mut summaries = write_txn.open_table(SUMMARIES).map_err(io_err)?;
            summaries.remove(id.0).map_err(io_err)?;
            existed
        };
        if !existed {
            write_txn.abort().map_err(io_err)?;
            return Err(NeiError::RunNotFound(id.0));
        }
        write_txn.commit().map_err(io_err)
    }

    /// Number of stored runs.
    pub fn len(&self) -> Result<usize, NeiError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(RUNS).map_err(io_err)?;
        Ok(table.len().map_err(io_err)? as usize)
    }

    pub fn is_empty(&self) -> Result<bool, NeiError> {
        Ok(self.len()? == 0)
    }
}

fn decode_summary(bytes: &[u8]) -> Result<RunSummary, NeiError> {
    postcard::from_bytes(bytes).map_err(|e| NeiError::DeserializationError(e.to_string()))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Abundances, IonizationStates, NumberDensity, Temperature, Time};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn sample_run(temperature: f64) -> Simulation {
        let mut fractions = BTreeMap::new();
        fractions.insert(Element::HYDROGEN, vec![0.4, 0.6]);
        let states = IonizationStates::new(
            fractions,
            &Abundances::solar(),
            Some(Temperature::kelvin(temperature)),
            Some(NumberDensity::per_cubic_cm(1.0)),
            1e-15,
        )
        .expect("states");
        Simulation::new(&states, Time::seconds(0.0)).expect("run")
    }

    #[test]
    fn basic_operations() {
        let temp = tempdir().expect("temp dir");
        let mut store = RunStore::open(temp.path().join("runs.redb")).expect("open db");
        assert!(store.is_empty().expect("empty"));

        let a = store.insert(&sample_run(1.0e4), Some("cold")).expect("insert");
        let b = store.insert(&sample_run(1.0e6), None).expect("insert");
        assert_ne!(a, b);
        assert_eq!(store.len().expect("len"), 2);
        assert_eq!(store.get(a).expect("get"), sample_run(1.0e4));

        let summaries = store.list().expect("list");
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].label.as_deref(), Some("cold"));
        assert_eq!(summaries[1].final_temperature, 1.0e6);
        assert_eq!(summaries[1].elements, vec![Element::HYDROGEN]);
    }

    #[test]
    fn remove_and_missing_runs() {
        let temp = tempdir().expect("temp dir");
        let mut store = RunStore::open(temp.path().join("runs.redb")).expect("open db");
        let id = store.insert(&sample_run(1.0e4), None).expect("insert");

        store.remove(id).expect("remove");
        assert!(matches!(store.get(id), Err(NeiError::RunNotFound(_))));
        assert!(matches!(store.remove(id), Err(NeiError::RunNotFound(_))));
        assert!(matches!(store.summary(RunId(99)), Err(NeiError::RunNotFound(99))));
        assert_eq!(store.len().expect("len"), 0);
    }

    #[test]
    fn persistence_and_ids_not_reused() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("runs.redb");
        let first = {
            let mut store = RunStore::open(&path).expect("open db");
            let id = store.insert(&sample_run(1.0e4), Some("kept")).expect("insert");
            let gone = store.insert(&sample_run(2.0e4), None).expect("insert");
            store.remove(gone).expect("remove");
            id
        };

        let mut store = RunStore::open(&path).expect("reopen db");
        assert_eq!(store.summary(first).expect("summary").label.as_deref(), Some("kept"));
        let next = store.insert(&sample_run(3.0e4), None).expect("insert");
        assert_eq!(next, RunId(first.0 + 2));
    }

    #[test]
    fn long_labels_rejected() {
        let temp = tempdir().expect("temp dir");
        let mut store = RunStore::open(temp.path().join("runs.redb")).expect("open db");
        let label = "x".repeat(MAX_LABEL_LENGTH + 1);
        assert!(store.insert(&sample_run(1.0e4), Some(&label)).is_err());
        assert!(store.is_empty().expect("empty"));
    }

    #[test]
    fn summary_checksum_matches_export() {
        let temp = tempdir().expect("temp dir");
        let mut store = RunStore::open(temp.path().join("runs.redb")).expect("open db");
        let run = sample_run(5.0e4);
        let id = store.insert(&run, None).expect("insert");
        assert_eq!(store.summary(id).expect("summary").checksum, canonical_checksum(&run));
    }
}
