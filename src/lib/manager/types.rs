use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::tasks::types::{JobStatus, TaskRecord};

/// Message reported while the runtime has no task for a job yet.
pub const TASK_NOT_AVAILABLE: &str = "task not available yet";

/// What the caller asks to run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub image: String,
    /// Whitespace separated command line.
    pub command: String,
    pub name: String,
    #[serde(default)]
    pub resources: HashMap<String, u64>,
    #[serde(default)]
    pub mount_dir: Option<String>,
}

impl JobSpec {
    pub fn new(
        image: impl Into<String>,
        command: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        JobSpec {
            image: image.into(),
            command: command.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_mount_dir(mut self, dir: impl Into<String>) -> Self {
        self.mount_dir = Some(dir.into());
        self
    }

    pub fn with_resource(mut self, key: impl Into<String>, quantity: u64) -> Self {
        self.resources.insert(key.into(), quantity);
        self
    }

    pub fn args(&self) -> Vec<String> {
        self.command.split_whitespace().map(str::to_string).collect()
    }
}

/// Reference to a scheduled job. The object behind it belongs to the
/// runtime; a handle is only valid for as long as the runtime keeps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub name: String,
    pub id: String,
}

/// Snapshot of a job, recomputed on every inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub status: JobStatus,
    pub message: String,
    pub name: String,
    pub image: String,
    pub cmd: String,
    pub timestamp: String,
}

impl JobInfo {
    pub fn not_available(name: &str) -> Self {
        JobInfo {
            status: JobStatus::NotStarted,
            message: TASK_NOT_AVAILABLE.to_string(),
            name: name.to_string(),
            image: String::new(),
            cmd: String::new(),
            timestamp: String::new(),
        }
    }

    pub fn from_task(name: &str, task: &TaskRecord, status: JobStatus) -> Self {
        JobInfo {
            status,
            message: task.status.message.clone(),
            name: name.to_string(),
            image: task.spec.container_spec.image.clone(),
            cmd: task.spec.container_spec.command.join(" "),
            timestamp: task.status.timestamp.clone(),
        }
    }
}

/// The only error a [`JobManager`] returns. `status_code` is meant to be
/// rendered as-is by an HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ManagerError {
    pub message: String,
    pub status_code: u16,
}

impl ManagerError {
    pub fn new(message: impl Into<String>, status_code: u16) -> Self {
        ManagerError {
            message: message.into(),
            status_code,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(message, 400)
    }
}

pub type ManagerResult<T> = Result<T, ManagerError>;

/// Backend-agnostic job scheduling.
#[async_trait]
pub trait JobManager: Send + Sync {
    /// Create the job's runtime object. Jobs are never restarted.
    async fn schedule(&self, spec: &JobSpec) -> ManagerResult<JobHandle>;

    /// Look up a previously scheduled job by name.
    async fn fetch(&self, name: &str) -> ManagerResult<JobHandle>;

    async fn inspect(&self, job: &JobHandle) -> ManagerResult<JobInfo>;

    /// Whole stdout/stderr history of the job.
    async fn get_logs(&self, job: &JobHandle) -> ManagerResult<String>;

    /// Delete the job's runtime object. Removing twice is an error.
    async fn remove(&self, job: &JobHandle) -> ManagerResult<()>;
}
