// ABOUTME: Stage execution result types and pipeline result aggregation
// ABOUTME: Defines result structures for individual stages and the whole run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: String,
    pub status: StageStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
    pub output: Option<String>,
    pub error: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Running,
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub run_id: String,
    pub seed: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
    pub status: PipelineStatus,
    pub stages: Vec<StageResult>,
    pub summary: PipelineSummary,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub total_stages: usize,
    pub successful_stages: usize,
    pub failed_stages: usize,
    pub skipped_stages: usize,
    pub success_rate: f64,
}

impl StageResult {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            duration: None,
            output: None,
            error: None,
            metadata: HashMap::new(),
        }
    }

    pub fn mark_started(&mut self) {
        self.status = StageStatus::Running;
        self.start_time = Utc::now();
    }

    pub fn mark_completed(
        &mut self,
        status: StageStatus,
        output: Option<String>,
        error: Option<String>,
    ) {
        self.status = status;
        self.end_time = Some(Utc::now());
        self.duration = Some(
            (Utc::now() - self.start_time)
                .to_std()
                .unwrap_or(Duration::ZERO),
        );
        self.output = output;
        self.error = error;
    }

    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn is_successful(&self) -> bool {
        self.status == StageStatus::Success
    }

    pub fn is_failed(&self) -> bool {
        self.status == StageStatus::Failed
    }
}

impl PipelineResult {
    pub fn new(run_id: impl Into<String>, seed: u64) -> Self {
        Self {
            run_id: run_id.into(),
            seed,
            start_time: Utc::now(),
            end_time: None,
            duration: None,
            status: PipelineStatus::Running,
            stages: Vec::new(),
            summary: PipelineSummary::default(),
            metadata: HashMap::new(),
        }
    }

    pub fn add_stage_result(&mut self, result: StageResult) {
        self.stages.push(result);
        self.update_summary();
    }

    pub fn mark_completed(&mut self) {
        self.end_time = Some(Utc::now());
        self.duration = Some(
            (Utc::now() - self.start_time)
                .to_std()
                .unwrap_or(Duration::ZERO),
        );
        self.status = if self.stages.iter().any(|s| s.is_failed()) {
            PipelineStatus::Failed
        } else {
            PipelineStatus::Success
        };
        self.update_summary();
    }

    pub fn get_stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage == name)
    }

    pub fn has_failures(&self) -> bool {
        self.stages.iter().any(|s| s.is_failed())
    }

    fn update_summary(&mut self) {
        let total = self.stages.len();
        let successful = self.stages.iter().filter(|s| s.is_successful()).count();
        let failed = self.stages.iter().filter(|s| s.is_failed()).count();
        let skipped = self
            .stages
            .iter()
            .filter(|s| s.status == StageStatus::Skipped)
            .count();
        let success_rate = if total > 0 {
            (successful as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        self.summary = PipelineSummary {
            total_stages: total,
            successful_stages: successful,
            failed_stages: failed,
            skipped_stages: skipped,
            success_rate,
        };
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Pending => write!(f, "pending"),
            StageStatus::Running => write!(f, "running"),
            StageStatus::Success => write!(f, "success"),
            StageStatus::Failed => write!(f, "failed"),
            StageStatus::Skipped => write!(f, "skipped"),
        }
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStatus::Running => write!(f, "running"),
            PipelineStatus::Success => write!(f, "success"),
            PipelineStatus::Failed => write!(f, "failed"),
        }
    }
}
