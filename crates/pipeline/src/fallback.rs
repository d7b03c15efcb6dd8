use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use common::ExecutionRecord;
use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;
use tracing::error;

struct State {
    current_size: u64,
}

/// Rotating newline-delimited-JSON sink for records that could not reach
/// Kafka. Every method swallows its own I/O errors; a `FallbackLog` must
/// never be the reason the pipeline stops working.
pub struct FallbackLog {
    dir: PathBuf,
    max_files: usize,
    max_file_size: u64,
    state: AsyncMutex<State>,
}

fn file_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("kafka-fallback-{index}.log"))
}

impl FallbackLog {
    pub fn new(dir: impl Into<PathBuf>, max_files: usize, max_file_size: u64, rotate_on_startup: bool) -> Self {
        let dir = dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            error!(error = %e, "failed to create fallback log directory");
        }

        let max_files = max_files.max(1);
        if rotate_on_startup {
            rotate_files(&dir, max_files);
        }

        Self {
            max_files,
            max_file_size: max_file_size.max(1),
            state: AsyncMutex::new(State {
                current_size: current_file_size(&dir, 0),
            }),
            dir,
        }
    }

    fn rotate_now(&self) {
        rotate_files(&self.dir, self.max_files);
    }

    async fn append_line(&self, line: &str) {
        let line_len = line.len() as u64 + 1;
        let mut state = self.state.lock().await;

        if state.current_size + line_len > self.max_file_size {
            self.rotate_now();
            state.current_size = 0;
        }

        let path = file_path(&self.dir, 0);
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{line}") {
                    error!(error = %e, "failed to write fallback log line");
                    return;
                }
                state.current_size += line_len;
            }
            Err(e) => error!(error = %e, path = %path.display(), "failed to open fallback log file"),
        }
    }

    pub async fn log_single(&self, record: &ExecutionRecord, reason: &str) {
        let payload = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "reason": reason,
            "message": record,
        });
        self.append_line(&payload.to_string()).await;
    }

    pub async fn log_batch(&self, records: &[ExecutionRecord], reason: &str) {
        let payload = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "reason": reason,
            "messageCount": records.len(),
            "messages": records,
        });
        self.append_line(&payload.to_string()).await;
    }
}

fn current_file_size(dir: &Path, index: usize) -> u64 {
    fs::metadata(file_path(dir, index)).map(|m| m.len()).unwrap_or(0)
}

/// Delete the oldest file if present, then shift every remaining file up by
/// one index, freeing `…-0.log` for the next append.
fn rotate_files(dir: &Path, max_files: usize) {
    let last = file_path(dir, max_files - 1);
    if last.exists() {
        if let Err(e) = fs::remove_file(&last) {
            error!(error = %e, "failed to remove oldest fallback log file");
        }
    }
    for i in (0..max_files.saturating_sub(1)).rev() {
        let from = file_path(dir, i);
        if from.exists() {
            let to = file_path(dir, i + 1);
            if let Err(e) = fs::rename(&from, &to) {
                error!(error = %e, "failed to rotate fallback log file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{
        AppInfo, Dimensions, EventKind, Flags, InstanceInfo, InstanceType, Involvement,
        LibraryInfo, Metrics, N8nContext, Properties, RecordContext,
    };
    use uuid::Uuid;

    fn sample_record() -> ExecutionRecord {
        ExecutionRecord {
            record_type: "track".to_string(),
            event: EventKind::Started,
            user_id: Some("user-1".to_string()),
            anonymous_id: None,
            timestamp: Utc::now(),
            message_id: Uuid::new_v4(),
            dimensions: Dimensions {
                execution_mode: "manual".to_string(),
                status: None,
                version: None,
                environment: None,
                trigger_type: Some("manual".to_string()),
                workflow_name: "wf".to_string(),
                error_type: None,
            },
            flags: Flags {
                is_manual_execution: true,
                is_retry: false,
            },
            metrics: Metrics {
                node_count: 1,
                duration_ms: None,
            },
            tags: vec![],
            involves: [
                Involvement::workflow_execution("exec-1"),
                Involvement::workflow("wf-1"),
            ],
            properties: Properties {
                trigger_node: None,
                retry_of: None,
                started_at: Utc::now(),
                finished_at: None,
                error_message: None,
                error_stack: None,
                error_node_id: None,
                error_node_name: None,
                workflow_version: None,
            },
            context: RecordContext {
                app: AppInfo {
                    name: "n8n".to_string(),
                    version: "1.0.0".to_string(),
                },
                library: LibraryInfo {
                    name: "n8n-kafka-execution-logger".to_string(),
                    version: "0.1.0".to_string(),
                },
                instance: InstanceInfo {
                    id: "host-1".to_string(),
                    instance_type: InstanceType::Main,
                },
                n8n: N8nContext {
                    execution_mode: "manual".to_string(),
                    instance_type: InstanceType::Main,
                },
            },
        }
    }

    #[tokio::test]
    async fn appends_one_json_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let log = FallbackLog::new(dir.path(), 3, 1_000_000, false);
        log.log_single(&sample_record(), "Queue overflow - message dropped").await;

        let content = fs::read_to_string(dir.path().join("kafka-fallback-0.log")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 1);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["reason"], "Queue overflow - message dropped");
        assert!(parsed["message"].is_object());
    }

    #[tokio::test]
    async fn batch_line_carries_message_count() {
        let dir = tempfile::tempdir().unwrap();
        let log = FallbackLog::new(dir.path(), 3, 1_000_000, false);
        let records = vec![sample_record(), sample_record(), sample_record()];
        log.log_batch(&records, "Send failed: AUTHENTICATION").await;

        let content = fs::read_to_string(dir.path().join("kafka-fallback-0.log")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(parsed["messageCount"], 3);
        assert_eq!(parsed["messages"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn rotates_when_max_file_size_would_be_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        let record = sample_record();
        let one_line_len = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "reason": "x",
            "message": &record,
        })
        .to_string()
        .len() as u64;

        let log = FallbackLog::new(dir.path(), 3, one_line_len + 1, false);
        log.log_single(&record, "first").await;
        assert!(dir.path().join("kafka-fallback-0.log").exists());
        assert!(!dir.path().join("kafka-fallback-1.log").exists());

        log.log_single(&record, "second").await;
        assert!(dir.path().join("kafka-fallback-1.log").exists());
        let rotated = fs::read_to_string(dir.path().join("kafka-fallback-1.log")).unwrap();
        assert!(rotated.contains("\"first\""));
        let current = fs::read_to_string(dir.path().join("kafka-fallback-0.log")).unwrap();
        assert!(current.contains("\"second\""));
    }

    #[tokio::test]
    async fn rotate_on_startup_shifts_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("kafka-fallback-0.log"), "stale\n").unwrap();

        let _log = FallbackLog::new(dir.path(), 2, 1_000_000, true);

        assert!(dir.path().join("kafka-fallback-1.log").exists());
        assert!(!dir.path().join("kafka-fallback-0.log").exists());
    }

    #[tokio::test]
    async fn oldest_file_is_discarded_when_rotation_runs_out_of_slots() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("kafka-fallback-0.log"), "newest\n").unwrap();
        fs::write(dir.path().join("kafka-fallback-1.log"), "oldest\n").unwrap();

        let log = FallbackLog::new(dir.path(), 2, 1_000_000, false);
        log.rotate_now();

        let content = fs::read_to_string(dir.path().join("kafka-fallback-1.log")).unwrap();
        assert_eq!(content, "newest\n");
        drop(log);
    }
}
