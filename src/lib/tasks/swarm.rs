use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use bollard::{
    Docker,
    container::{ListContainersOptions, LogsOptions},
    models::{
        ContainerSummary, Limit, Mount, MountTypeEnum, ServiceSpec, TaskSpec as ServiceTaskSpec,
        TaskSpecContainerSpec, TaskSpecResources, TaskSpecRestartPolicy,
        TaskSpecRestartPolicyConditionEnum,
    },
};
use futures_util::stream::StreamExt;
use tracing::{debug, info};

use super::{
    podman::task_record,
    types::{CreateRequest, RuntimeClient, RuntimeError, RuntimeResult, TaskRecord},
};
use crate::config::ManagerConfig;

/// Label Swarm puts on every container it runs for a service.
const SERVICE_ID_LABEL: &str = "com.docker.swarm.service.id";

/// Docker Swarm: each job is a service running a single task. Task state is
/// read from the task's container, so a task is only observable once Swarm
/// has placed it on the node this client talks to.
#[derive(Debug, Clone)]
pub struct SwarmRuntime {
    client: Docker,
    timeout: Duration,
}

impl SwarmRuntime {
    pub fn new(config: &ManagerConfig) -> RuntimeResult<Self> {
        debug!(timeout = ?config.runtime_timeout, "connecting to swarm manager with local defaults");
        let client = Docker::connect_with_local_defaults()?.with_timeout(config.runtime_timeout);
        Ok(SwarmRuntime {
            client,
            timeout: config.runtime_timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn latest_container(&self, service: &str) -> RuntimeResult<Option<String>> {
        let containers = self
            .client
            .list_containers(Some(task_containers(service)))
            .await?;
        Ok(newest_container(containers))
    }
}

/// Every container, running or not, that belongs to `service`.
fn task_containers(service: &str) -> ListContainersOptions<String> {
    ListContainersOptions {
        all: true,
        filters: HashMap::from([(
            "label".to_string(),
            vec![format!("{SERVICE_ID_LABEL}={service}")],
        )]),
        ..Default::default()
    }
}

fn newest_container(containers: Vec<ContainerSummary>) -> Option<String> {
    containers
        .into_iter()
        .filter(|c| c.id.is_some())
        .max_by_key(|c| c.created.unwrap_or_default())
        .and_then(|c| c.id)
}

#[async_trait]
impl RuntimeClient for SwarmRuntime {
    async fn create(&self, request: &CreateRequest) -> RuntimeResult<String> {
        let created = self.client.create_service(service_spec(request), None).await?;
        let id = created
            .id
            .ok_or_else(|| RuntimeError::opaque("swarm returned no service id"))?;
        info!(%id, name = %request.name, "service created");
        Ok(id)
    }

    async fn get(&self, name: &str) -> RuntimeResult<String> {
        let service = self.client.inspect_service(name, None).await?;
        Ok(service.id.unwrap_or_else(|| name.to_string()))
    }

    async fn inspect(&self, id: &str) -> RuntimeResult<Option<TaskRecord>> {
        let Some(container) = self.latest_container(id).await? else {
            return Ok(None);
        };
        let inspected = self.client.inspect_container(&container, None).await?;
        Ok(task_record(inspected))
    }

    async fn logs(&self, id: &str) -> RuntimeResult<Vec<Vec<u8>>> {
        let Some(container) = self.latest_container(id).await? else {
            return Ok(Vec::new());
        };

        let options = Some(LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: "all".to_string(),
            ..Default::default()
        });
        let mut stream = self.client.logs(&container, options);
        let mut chunks = Vec::new();
        while let Some(msg) = stream.next().await {
            chunks.push(msg?.into_bytes().to_vec());
        }

        Ok(chunks)
    }

    async fn remove(&self, id: &str) -> RuntimeResult<()> {
        self.client.delete_service(id).await?;
        info!(%id, "service removed");
        Ok(())
    }
}

fn service_spec(request: &CreateRequest) -> ServiceSpec {
    let mounts = request
        .mounts
        .iter()
        .map(|mount| Mount {
            source: Some(mount.source.clone()),
            target: Some(mount.destination.clone()),
            typ: Some(MountTypeEnum::BIND),
            read_only: Some(!mount.is_read_write()),
            ..Default::default()
        })
        .collect();

    let condition = if request.restart_policy.name == "no" {
        TaskSpecRestartPolicyConditionEnum::NONE
    } else {
        TaskSpecRestartPolicyConditionEnum::ON_FAILURE
    };

    let limits = Limit {
        nano_cpus: request
            .resources
            .get("cpu_limit")
            .and_then(|m| i64::try_from(*m).ok())
            .and_then(|m| m.checked_mul(1_000_000)),
        memory_bytes: request
            .resources
            .get("memory_limit")
            .and_then(|m| i64::try_from(*m).ok())
            .and_then(|m| m.checked_mul(1024 * 1024)),
        ..Default::default()
    };

    ServiceSpec {
        name: Some(request.name.clone()),
        task_template: Some(ServiceTaskSpec {
            container_spec: Some(TaskSpecContainerSpec {
                image: Some(request.image.clone()),
                command: Some(request.args.clone()),
                tty: Some(request.tty),
                mounts: Some(mounts),
                ..Default::default()
            }),
            restart_policy: Some(TaskSpecRestartPolicy {
                condition: Some(condition),
                max_attempts: Some(request.restart_policy.maximum_retry_count),
                ..Default::default()
            }),
            resources: Some(TaskSpecResources {
                limits: Some(limits),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
