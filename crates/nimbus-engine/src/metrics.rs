//! Performance tracking.
//!
//! Records satisfaction ratings, learning efficiency, knowledge retention,
//! and task completions into a JSON file, and summarizes them as simple
//! averages. Everything becomes a no-op when tracking is disabled.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use nimbus_types::error::{NimbusError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SatisfactionSample {
    pub timestamp: DateTime<Utc>,
    pub rating: f64,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningSample {
    pub timestamp: DateTime<Utc>,
    pub task_id: String,
    pub learning_time: f64,
    pub improvement_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionSample {
    pub timestamp: DateTime<Utc>,
    pub topic: String,
    pub recall_accuracy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionSample {
    pub timestamp: DateTime<Utc>,
    pub task_id: String,
    pub success: bool,
    pub completion_time: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MetricsFile {
    #[serde(default)]
    user_satisfaction: Vec<SatisfactionSample>,
    #[serde(default)]
    learning_efficiency: Vec<LearningSample>,
    #[serde(default)]
    knowledge_retention: Vec<RetentionSample>,
    #[serde(default)]
    task_completion: Vec<CompletionSample>,
}

/// Averages over the recorded series, all `0.0` when a series is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub user_satisfaction_avg: f64,
    pub learning_efficiency_avg: f64,
    pub knowledge_retention_avg: f64,
    pub task_completion_rate: f64,
}

/// File-backed tracker. Each `record_*` call writes through to disk so a
/// crash loses at most the call in flight.
pub struct PerformanceTracker {
    path: PathBuf,
    enabled: bool,
    data: Mutex<MetricsFile>,
}

impl PerformanceTracker {
    /// Load existing metrics from `path`, or start empty. A disabled
    /// tracker never touches the filesystem.
    pub fn new(path: PathBuf, enabled: bool) -> Result<Self> {
        let data = if enabled && path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "metrics file unreadable, starting fresh");
                MetricsFile::default()
            })
        } else {
            MetricsFile::default()
        };
        Ok(Self {
            path,
            enabled,
            data: Mutex::new(data),
        })
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn record_satisfaction(&self, rating: f64, feedback: Option<String>) -> Result<()> {
        self.record(|d| {
            d.user_satisfaction.push(SatisfactionSample {
                timestamp: Utc::now(),
                rating,
                feedback,
            })
        })
    }

    pub fn record_learning(
        &self,
        task_id: impl Into<String>,
        learning_time: f64,
        improvement_rate: f64,
    ) -> Result<()> {
        let task_id = task_id.into();
        self.record(|d| {
            d.learning_efficiency.push(LearningSample {
                timestamp: Utc::now(),
                task_id,
                learning_time,
                improvement_rate,
            })
        })
    }

    pub fn record_retention(&self, topic: impl Into<String>, recall_accuracy: f64) -> Result<()> {
        let topic = topic.into();
        self.record(|d| {
            d.knowledge_retention.push(RetentionSample {
                timestamp: Utc::now(),
                topic,
                recall_accuracy,
            })
        })
    }

    pub fn record_completion(
        &self,
        task_id: impl Into<String>,
        success: bool,
        completion_time: f64,
    ) -> Result<()> {
        let task_id = task_id.into();
        self.record(|d| {
            d.task_completion.push(CompletionSample {
                timestamp: Utc::now(),
                task_id,
                success,
                completion_time,
            })
        })
    }

    pub fn summary(&self) -> Result<MetricsSummary> {
        let data = self.data.lock().map_err(|_| lock_poisoned())?;
        Ok(MetricsSummary {
            user_satisfaction_avg: avg(data.user_satisfaction.iter().map(|s| s.rating)),
            learning_efficiency_avg: avg(data.learning_efficiency.iter().map(|s| s.improvement_rate)),
            knowledge_retention_avg: avg(data.knowledge_retention.iter().map(|s| s.recall_accuracy)),
            task_completion_rate: {
                let total = data.task_completion.len();
                if total == 0 {
                    0.0
                } else {
                    let ok = data.task_completion.iter().filter(|s| s.success).count();
                    ok as f64 / total as f64
                }
            },
        })
    }

    fn record(&self, apply: impl FnOnce(&mut MetricsFile)) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let mut data = self.data.lock().map_err(|_| lock_poisoned())?;
        apply(&mut data);
        self.flush(&data)
    }

    fn flush(&self, data: &MetricsFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(data)?;
        std::fs::write(&self.path, raw)?;
        debug!(path = %self.path.display(), "metrics flushed");
        Ok(())
    }
}

fn avg(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 { 0.0 } else { sum / count as f64 }
}

fn lock_poisoned() -> NimbusError {
    NimbusError::Persistence("metrics lock poisoned".into())
}
