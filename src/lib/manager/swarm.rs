//! Docker Swarm backend.

use async_trait::async_trait;
use tracing::{debug, info};

use super::{
    manager::{create_request, lookup_error, runtime_error},
    types::{JobHandle, JobInfo, JobManager, JobSpec, ManagerResult},
};
use crate::tasks::{
    swarm::SwarmRuntime,
    types::{JobStatus, RuntimeClient},
};

/// Schedules each job as a one-task Swarm service.
#[derive(Debug)]
pub struct SwarmManager<R = SwarmRuntime> {
    runtime: R,
}

impl<R: RuntimeClient> SwarmManager<R> {
    pub fn new(runtime: R) -> Self {
        SwarmManager { runtime }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }
}

/// Uniform status for a Swarm task state.
pub fn normalize_status(state: &str) -> JobStatus {
    match state {
        "new" | "allocated" | "pending" | "assigned" | "accepted" | "preparing" | "ready"
        | "starting" => JobStatus::NotStarted,
        "running" => JobStatus::Started,
        "failed" | "rejected" => JobStatus::FinishedWithError,
        "complete" => JobStatus::FinishedSuccessfully,
        _ => JobStatus::Undefined,
    }
}

#[async_trait]
impl<R: RuntimeClient> JobManager for SwarmManager<R> {
    async fn schedule(&self, spec: &JobSpec) -> ManagerResult<JobHandle> {
        let request = create_request(spec)?;
        info!(
            image = %request.image,
            command = %spec.command,
            name = %request.name,
            mounts = ?request.mounts,
            "create service"
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
        match self.runtime.inspect(&job.id).await.map_err(runtime_error)? {
            Some(task) => {
                let status = normalize_status(task.native_state());
                debug!(name = %job.name, native = task.native_state(), %status, "inspected service");
                Ok(JobInfo::from_task(&job.name, &task, status))
            }
            None => Ok(JobInfo::not_available(&job.name)),
        }
    }

    async fn get_logs(&self, job: &JobHandle) -> ManagerResult<String> {
        let chunks = self.runtime.logs(&job.id).await.map_err(runtime_error)?;
        // Chunk boundaries can split a multi-byte character.
        Ok(String::from_utf8_lossy(&chunks.concat()).into_owned())
    }

    async fn remove(&self, job: &JobHandle) -> ManagerResult<()> {
        info!(name = %job.name, "remove service");
        self.runtime.remove(&job.id).await.map_err(runtime_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::memory::InMemoryRuntime;

    #[test]
    fn swarm_specific_states() {
        assert_eq!(normalize_status("allocated"), JobStatus::NotStarted);
        assert_eq!(normalize_status("ready"), JobStatus::NotStarted);
        assert_eq!(normalize_status("rejected"), JobStatus::FinishedWithError);
        assert_eq!(normalize_status("shutdown"), JobStatus::Undefined);
        assert_eq!(normalize_status("orphaned"), JobStatus::Undefined);
    }

    #[test]
    fn shared_states_match_reference_table() {
        assert_eq!(normalize_status("pending"), JobStatus::NotStarted);
        assert_eq!(normalize_status("running"), JobStatus::Started);
        assert_eq!(normalize_status("failed"), JobStatus::FinishedWithError);
        assert_eq!(normalize_status("complete"), JobStatus::FinishedSuccessfully);
    }

    #[tokio::test]
    async fn logs_decode_after_joining_chunks() {
        let manager = SwarmManager::new(InMemoryRuntime::new());
        let job = manager
            .schedule(&JobSpec::new("busybox", "echo é", "svc2"))
            .await
            .unwrap();
        manager.runtime().push_log("svc2", b"\xc3").await.unwrap();
        manager.runtime().push_log("svc2", b"\xa9").await.unwrap();

        assert_eq!(manager.get_logs(&job).await.unwrap(), "é");
    }

    #[tokio::test]
    async fn rejected_task_is_reported_as_failed() {
        let manager = SwarmManager::new(InMemoryRuntime::new());
        let job = manager
            .schedule(&JobSpec::new("busybox", "false", "svc1"))
            .await
            .unwrap();
        manager
            .runtime()
            .report_state("svc1", "rejected", "no suitable node")
            .await
            .unwrap();

        let info = manager.inspect(&job).await.unwrap();
        assert_eq!(info.status, JobStatus::FinishedWithError);
        assert_eq!(info.message, "no suitable node");
        assert_eq!(info.cmd, "false");
    }
}
