//! On-disk results of a batch, one JSON document per task.
//!
//! A batch interrupted part-way can be resumed: tasks with a saved run are
//! skipped on the next invocation.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BenchError, BenchResult};
use crate::recorder::SimulationRun;

const RESULT_EXTENSION: &str = "json";

/// A directory of sealed runs named `<task_id>.json`.
#[derive(Debug, Clone)]
pub struct ResultsDir {
    root: PathBuf,
}

impl ResultsDir {
    /// Opens `root`, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> BenchResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| BenchError::io(format!("create results dir {}: {e}", root.display())))?;
        Ok(Self { root })
    }

    /// The directory path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, task_id: &str) -> BenchResult<PathBuf> {
        if task_id.is_empty()
            || task_id.contains(['/', '\\'])
            || task_id == "."
            || task_id == ".."
        {
            return Err(BenchError::io(format!("task id '{task_id}' is not a valid file name")));
        }
        Ok(self.root.join(format!("{task_id}.{RESULT_EXTENSION}")))
    }

    /// Writes `run`, replacing any earlier run of the same task.
    pub fn save(&self, run: &SimulationRun) -> BenchResult<PathBuf> {
        let path = self.path_for(&run.task_id)?;
        let json = serde_json::to_vec_pretty(run)
            .map_err(|e| BenchError::internal(format!("serialize run {}: {e}", run.id)))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| BenchError::io(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &path)
            .map_err(|e| BenchError::io(format!("rename {}: {e}", path.display())))?;
        tracing::debug!(task_id = %run.task_id, path = %path.display(), "run saved");
        Ok(path)
    }

    /// Reads the saved run of `task_id`, if any.
    pub fn load(&self, task_id: &str) -> BenchResult<Option<SimulationRun>> {
        let path = self.path_for(task_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)
            .map_err(|e| BenchError::io(format!("read {}: {e}", path.display())))?;
        let run = serde_json::from_str(&text)
            .map_err(|e| BenchError::io(format!("decode {}: {e}", path.display())))?;
        Ok(Some(run))
    }

    /// Ids of tasks with a saved run.
    pub fn completed_task_ids(&self) -> BenchResult<BTreeSet<String>> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| BenchError::io(format!("list {}: {e}", self.root.display())))?;
        let mut ids = BTreeSet::new();
        for entry in entries {
            let path = entry
                .map_err(|e| BenchError::io(format!("list {}: {e}", self.root.display())))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some(RESULT_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.insert(stem.to_string());
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Observation;
    use crate::recorder::{RunRecorder, TerminationReason};
    use serde_json::json;

    fn run(task_id: &str) -> SimulationRun {
        let mut recorder = RunRecorder::open(task_id, "bank");
        recorder.observe(Observation::user("hello"));
        recorder.seal(TerminationReason::UserStop, json!({"accounts": {}}), "abc".to_string())
    }

    #[test]
    fn saved_runs_are_listed_and_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let results = ResultsDir::new(dir.path().join("out")).unwrap();
        assert!(results.completed_task_ids().unwrap().is_empty());

        let first = run("task-1");
        results.save(&first).unwrap();
        results.save(&run("task-2")).unwrap();
        fs::write(results.root().join("notes.txt"), "ignored").unwrap();

        let ids: Vec<String> = results.completed_task_ids().unwrap().into_iter().collect();
        assert_eq!(ids, vec!["task-1".to_string(), "task-2".to_string()]);
        assert_eq!(results.load("task-1").unwrap(), Some(first));
        assert_eq!(results.load("task-3").unwrap(), None);
    }

    #[test]
    fn path_like_task_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let results = ResultsDir::new(dir.path()).unwrap();
        assert!(results.save(&run("../escape")).is_err());
        assert!(results.load("..").is_err());
    }
}
