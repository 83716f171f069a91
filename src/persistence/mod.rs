// src/persistence/mod.rs
use crate::domain::errors::PersistenceResult;
use crate::domain::models::TickBar;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Persisted summary of a completed bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarRecord {
    pub resolution: u32,
    pub volume: f64,
    pub delta_percentage: f64,
    pub formation_seconds: f64,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&TickBar> for BarRecord {
    fn from(bar: &TickBar) -> Self {
        Self {
            resolution: bar.resolution,
            volume: bar.volume,
            delta_percentage: bar.delta_percentage(),
            formation_seconds: bar.formation_secs(),
            completed_at: bar.completed_at,
        }
    }
}

#[async_trait]
pub trait BarStore: Send + Sync {
    async fn store(&self, record: &BarRecord) -> PersistenceResult<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// JSON-lines file receiving one record per completed bar
    pub bar_log_path: Option<PathBuf>,
}

/// Appends one JSON object per line
pub struct JsonLinesBarStore {
    path: PathBuf,
    // serializes appends from concurrent callers
    write_lock: Mutex<()>,
}

impl JsonLinesBarStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl BarStore for JsonLinesBarStore {
    async fn store(&self, record: &BarRecord) -> PersistenceResult<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::PersistenceError;
    use chrono::Duration;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "bar-store-{}-{}-{}.jsonl",
            tag,
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ))
    }

    fn sealed_bar() -> TickBar {
        let start = Utc::now();
        let mut bar = TickBar::new(500, start);
        bar.tick_count = 500;
        bar.volume = 40.0;
        bar.ask_volume = 30.0;
        bar.bid_volume = 10.0;
        bar.completed_at = Some(start + Duration::seconds(12));
        bar
    }

    #[test]
    fn record_summarizes_bar() {
        let record = BarRecord::from(&sealed_bar());
        assert_eq!(record.resolution, 500);
        assert_eq!(record.volume, 40.0);
        assert_eq!(record.delta_percentage, -0.5);
        assert_eq!(record.formation_seconds, 12.0);
    }

    #[tokio::test]
    async fn appends_one_line_per_record() {
        let path = temp_path("append");
        let store = JsonLinesBarStore::new(&path);
        let record = BarRecord::from(&sealed_bar());

        store.store(&record).await.unwrap();
        store.store(&record).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: BarRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed, record);

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn missing_directory_is_an_io_error() {
        let path = temp_path("missing").join("nested").join("bars.jsonl");
        let store = JsonLinesBarStore::new(&path);
        let result = store.store(&BarRecord::from(&sealed_bar())).await;
        assert!(matches!(result, Err(PersistenceError::Io(_))));
    }
}
