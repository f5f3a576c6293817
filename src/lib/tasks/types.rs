use std::{collections::HashMap, fmt};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// In-container path where a job's mount directory is bound.
pub const SHARE_DIR: &str = "/share";

/// Uniform job lifecycle, identical across backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    #[serde(rename = "notstarted")]
    NotStarted,
    #[serde(rename = "started")]
    Started,
    #[serde(rename = "finishedWithError")]
    FinishedWithError,
    #[serde(rename = "finishedSuccessfully")]
    FinishedSuccessfully,
    #[serde(rename = "undefined")]
    Undefined,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::NotStarted => "notstarted",
            JobStatus::Started => "started",
            JobStatus::FinishedWithError => "finishedWithError",
            JobStatus::FinishedSuccessfully => "finishedSuccessfully",
            JobStatus::Undefined => "undefined",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bind mount descriptor handed to the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    pub source: String,
    pub destination: String,
    #[serde(rename = "type")]
    pub typ: String,
    pub options: Vec<String>,
}

impl MountSpec {
    /// Read-write bind of `source` at [`SHARE_DIR`].
    pub fn share(source: impl Into<String>) -> Self {
        MountSpec {
            source: source.into(),
            destination: SHARE_DIR.to_string(),
            typ: "bind".to_string(),
            options: vec!["rw".to_string()],
        }
    }

    pub fn is_read_write(&self) -> bool {
        self.options.iter().any(|o| o == "rw")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestartPolicySpec {
    pub name: String,
    pub maximum_retry_count: i64,
}

impl RestartPolicySpec {
    /// Jobs run exactly once per schedule call.
    pub fn never() -> Self {
        RestartPolicySpec {
            name: "no".to_string(),
            maximum_retry_count: 0,
        }
    }
}

/// Everything a runtime needs to create the native object behind a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub image: String,
    pub args: Vec<String>,
    pub name: String,
    pub mounts: Vec<MountSpec>,
    pub restart_policy: RestartPolicySpec,
    pub tty: bool,
    pub resources: HashMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSpec {
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskSpec {
    pub container_spec: ContainerSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskStatus {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskState {
    pub status: String,
}

/// A runtime's view of the task running a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskRecord {
    pub spec: TaskSpec,
    pub status: TaskStatus,
    pub state: TaskState,
}

impl TaskRecord {
    pub fn native_state(&self) -> &str {
        &self.state.status
    }
}

/// Failure reported by a runtime client. `status_code` is the runtime's own
/// HTTP code when it sent one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RuntimeError {
    pub status_code: Option<u16>,
    pub message: String,
}

impl RuntimeError {
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        RuntimeError {
            status_code: Some(status_code),
            message: message.into(),
        }
    }

    pub fn opaque(message: impl Into<String>) -> Self {
        RuntimeError {
            status_code: None,
            message: message.into(),
        }
    }
}

impl From<bollard::errors::Error> for RuntimeError {
    fn from(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code,
                message,
            } => RuntimeError::new(status_code, message),
            other => RuntimeError::opaque(other.to_string()),
        }
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// The container runtime as seen by a backend adapter.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Create the native object for a job and return its id.
    async fn create(&self, request: &CreateRequest) -> RuntimeResult<String>;

    /// Resolve a job name to the native object id.
    async fn get(&self, name: &str) -> RuntimeResult<String>;

    /// `None` while the runtime has no task to report for the object.
    async fn inspect(&self, id: &str) -> RuntimeResult<Option<TaskRecord>>;

    /// Combined stdout/stderr chunks in emission order.
    async fn logs(&self, id: &str) -> RuntimeResult<Vec<Vec<u8>>>;

    async fn remove(&self, id: &str) -> RuntimeResult<()>;
}
