//! Result sink: where a worker's accumulated records land at batch end.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use crate::model::CollectedRecord;

/// Accepts one worker's ordered records; called once per worker at batch
/// completion.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn flush(&self, worker_id: usize, records: &[CollectedRecord]) -> Result<()>;
}

/// Writes each worker's records to `results_worker_{id}.json` under a
/// directory.
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ResultSink for JsonFileSink {
    async fn flush(&self, worker_id: usize, records: &[CollectedRecord]) -> Result<()> {
        let path = self.dir.join(format!("results_worker_{worker_id}.json"));
        let body = serde_json::to_vec_pretty(records).context("failed to serialize records")?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(worker = worker_id, records = records.len(), path = %path.display(), "flushed results");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn flush_writes_one_artifact_per_worker() {
        let td = tempdir().unwrap();
        let sink = JsonFileSink::new(td.path());
        let records = vec![CollectedRecord {
            id: "1".into(),
            url: "https://twitter.com/i/status/1".into(),
            text: "hello".into(),
            query: "q".into(),
        }];

        sink.flush(3, &records).await.unwrap();

        let written = std::fs::read_to_string(td.path().join("results_worker_3.json")).unwrap();
        let parsed: Vec<CollectedRecord> = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, records);
    }

    #[tokio::test]
    async fn flush_writes_empty_artifact() {
        let td = tempdir().unwrap();
        let sink = JsonFileSink::new(td.path());
        sink.flush(0, &[]).await.unwrap();
        assert!(td.path().join("results_worker_0.json").exists());
    }
}
