//! Podman backend.

use async_trait::async_trait;
use tracing::{debug, info};

use super::{
    manager::{create_request, lookup_error, runtime_error},
    types::{JobHandle, JobInfo, JobManager, JobSpec, ManagerResult},
};
use crate::tasks::{
    podman::PodmanRuntime,
    types::{JobStatus, RuntimeClient},
};

/// Schedules each job as a single Podman container.
#[derive(Debug)]
pub struct PodmanManager<R = PodmanRuntime> {
    runtime: R,
}

impl<R: RuntimeClient> PodmanManager<R> {
    pub fn new(runtime: R) -> Self {
        PodmanManager { runtime }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }
}

/// Uniform status for a native task state.
pub fn normalize_status(state: &str) -> JobStatus {
    match state {
        "new" | "pending" | "assigned" | "accepted" | "preparing" | "starting" => {
            JobStatus::NotStarted
        }
        "running" => JobStatus::Started,
        "failed" => JobStatus::FinishedWithError,
        "complete" => JobStatus::FinishedSuccessfully,
        _ => JobStatus::Undefined,
    }
}

#[async_trait]
impl<R: RuntimeClient> JobManager for PodmanManager<R> {
    async fn schedule(&self, spec: &JobSpec) -> ManagerResult<JobHandle> {
        let request = create_request(spec)?;
        info!(
            image = %request.image,
            command = %spec.command,
            name = %request.name,
            mounts = ?request.mounts,
            restart_policy = ?request.restart_policy,
            "create container"
        );

        let id = self.runtime.create(&request).await.map_err(runtime_error)?;
        Ok(JobHandle {
            name: request.name,
            id,
        })
    }

    async fn fetch(&self, name: &str) -> ManagerResult<JobHandle> {
        let id = self.runtime.get(name).await.map_err(lookup_error)?;
        Ok(JobHandle {
            name: name.to_string(),
            id,
        })
    }

    async fn inspect(&self, job: &JobHandle) -> ManagerResult<JobInfo> {
        let task = self.runtime.inspect(&job.id).await.map_err(runtime_error)?;
        let Some(task) = task else {
            debug!(name = %job.name, "no task yet");
            return Ok(JobInfo::not_available(&job.name));
        };

        let status = normalize_status(task.native_state());
        debug!(name = %job.name, native = task.native_state(), %status, "inspected job");
        Ok(JobInfo::from_task(&job.name, &task, status))
    }

    async fn get_logs(&self, job: &JobHandle) -> ManagerResult<String> {
        let chunks = self.runtime.logs(&job.id).await.map_err(runtime_error)?;
        // Chunk boundaries can split a multi-byte character.
        Ok(String::from_utf8_lossy(&chunks.concat()).into_owned())
    }

    async fn remove(&self, job: &JobHandle) -> ManagerResult<()> {
        info!(name = %job.name, "remove container");
        self.runtime.remove(&job.id).await.map_err(runtime_error)
    }
}
