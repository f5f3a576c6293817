use std::{collections::HashMap, future::Future, time::Duration};

use async_trait::async_trait;
use bollard::{
    API_DEFAULT_VERSION, Docker,
    container::{
        Config, CreateContainerOptions, LogsOptions, RemoveContainerOptions,
        StartContainerOptions,
    },
    models::{
        ContainerInspectResponse, ContainerStateStatusEnum, HostConfig, Mount, MountTypeEnum,
        RestartPolicy, RestartPolicyNameEnum,
    },
};
use futures_util::stream::StreamExt;
use tracing::{debug, info, warn};

use super::types::{
    ContainerSpec, CreateRequest, MountSpec, RestartPolicySpec, RuntimeClient, RuntimeError,
    RuntimeResult,
    TaskRecord, TaskSpec, TaskState, TaskStatus,
};
use crate::config::ManagerConfig;

/// Podman reached through its Docker-compatible REST API.
#[derive(Debug, Clone)]
pub struct PodmanRuntime {
    client: Docker,
    timeout: Duration,
}

impl PodmanRuntime {
    pub fn new(config: &ManagerConfig) -> RuntimeResult<Self> {
        let address = config.podman_url();
        debug!(%address, "connecting to podman");
        let client = Docker::connect_with_http(
            &address,
            config.runtime_timeout.as_secs(),
            API_DEFAULT_VERSION,
        )?;

        Ok(PodmanRuntime {
            client,
            timeout: config.runtime_timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl RuntimeClient for PodmanRuntime {
    async fn create(&self, request: &CreateRequest) -> RuntimeResult<String> {
        let container_config = container_config(request);
        let options = Some(CreateContainerOptions {
            name: request.name.clone(),
            ..Default::default()
        });

        let created = self
            .client
            .create_container(options, container_config)
            .await?;
        info!(id = %created.id, name = %request.name, "container created");

        let started = self
            .client
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(RuntimeError::from);
        discard_on_failure(&created.id, started, self.remove(&created.id)).await?;
        info!(id = %created.id, "container started");

        Ok(created.id)
    }

    async fn get(&self, name: &str) -> RuntimeResult<String> {
        let container = self.client.inspect_container(name, None).await?;
        Ok(container.id.unwrap_or_else(|| name.to_string()))
    }

    async fn inspect(&self, id: &str) -> RuntimeResult<Option<TaskRecord>> {
        let container = self.client.inspect_container(id, None).await?;
        Ok(task_record(container))
    }

    async fn logs(&self, id: &str) -> RuntimeResult<Vec<Vec<u8>>> {
        let options = Some(LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: "all".to_string(),
            ..Default::default()
        });

        let mut stream = self.client.logs(id, options);
        let mut chunks = Vec::new();
        while let Some(msg) = stream.next().await {
            chunks.push(msg?.into_bytes().to_vec());
        }

        Ok(chunks)
    }

    async fn remove(&self, id: &str) -> RuntimeResult<()> {
        let options = Some(RemoveContainerOptions {
            force: true,
            ..Default::default()
        });
        self.client.remove_container(id, options).await?;
        info!(%id, "container removed");
        Ok(())
    }
}

/// A container that failed to start would keep its name taken; remove it and
/// report the start failure.
async fn discard_on_failure<F>(id: &str, started: RuntimeResult<()>, discard: F) -> RuntimeResult<()>
where
    F: Future<Output = RuntimeResult<()>>,
{
    let Err(err) = started else {
        return Ok(());
    };
    if let Err(cleanup) = discard.await {
        warn!(%id, error = %cleanup, "could not remove container after failed start");
    }
    Err(err)
}

fn container_config(request: &CreateRequest) -> Config<String> {
    let host_config = HostConfig {
        mounts: Some(request.mounts.iter().map(bind_mount).collect()),
        restart_policy: Some(restart_policy(&request.restart_policy)),
        nano_cpus: nano_cpus(&request.resources),
        memory: memory_bytes(&request.resources),
        ..Default::default()
    };

    Config {
        image: Some(request.image.clone()),
        cmd: Some(request.args.clone()),
        tty: Some(request.tty),
        host_config: Some(host_config),
        ..Default::default()
    }
}

fn bind_mount(mount: &MountSpec) -> Mount {
    Mount {
        source: Some(mount.source.clone()),
        target: Some(mount.destination.clone()),
        typ: Some(MountTypeEnum::BIND),
        read_only: Some(!mount.is_read_write()),
        ..Default::default()
    }
}

fn restart_policy(policy: &RestartPolicySpec) -> RestartPolicy {
    RestartPolicy {
        name: Some(
            policy
                .name
                .parse()
                .unwrap_or(RestartPolicyNameEnum::NO),
        ),
        maximum_retry_count: Some(policy.maximum_retry_count),
    }
}

/// `cpu_limit` is expressed in millicores.
fn nano_cpus(resources: &HashMap<String, u64>) -> Option<i64> {
    let millicores = i64::try_from(*resources.get("cpu_limit")?).ok()?;
    millicores.checked_mul(1_000_000)
}

/// `memory_limit` is expressed in MiB.
fn memory_bytes(resources: &HashMap<String, u64>) -> Option<i64> {
    let mib = i64::try_from(*resources.get("memory_limit")?).ok()?;
    mib.checked_mul(1024 * 1024)
}

/// Container status expressed in task vocabulary. `None` while there is
/// nothing to report yet.
fn task_state(status: &ContainerStateStatusEnum, exit_code: Option<i64>) -> Option<String> {
    let state = match status {
        ContainerStateStatusEnum::EMPTY => return None,
        ContainerStateStatusEnum::CREATED => "new",
        ContainerStateStatusEnum::RESTARTING => "starting",
        ContainerStateStatusEnum::RUNNING => "running",
        ContainerStateStatusEnum::EXITED if exit_code.unwrap_or(0) == 0 => "complete",
        ContainerStateStatusEnum::EXITED | ContainerStateStatusEnum::DEAD => "failed",
        other => return Some(other.to_string()),
    };
    Some(state.to_string())
}

pub(super) fn task_record(container: ContainerInspectResponse) -> Option<TaskRecord> {
    let state = container.state?;
    let status = state.status?;
    let native = task_state(&status, state.exit_code)?;

    let timestamp = match &status {
        ContainerStateStatusEnum::EXITED | ContainerStateStatusEnum::DEAD => state.finished_at,
        ContainerStateStatusEnum::RUNNING => state.started_at,
        _ => container.created,
    };
    let message = match state.error {
        Some(error) if !error.is_empty() => error,
        _ => status.to_string(),
    };
    let config = container.config.unwrap_or_default();

    Some(TaskRecord {
        spec: TaskSpec {
            container_spec: ContainerSpec {
                image: config.image.unwrap_or_default(),
                command: config.cmd.unwrap_or_default(),
            },
        },
        status: TaskStatus {
            timestamp: timestamp.unwrap_or_default(),
            message,
        },
        state: TaskState { status: native },
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use bollard::models::{ContainerConfig, ContainerState};

    use super::*;

    fn request(mounts: Vec<MountSpec>, resources: HashMap<String, u64>) -> CreateRequest {
        CreateRequest {
            image: "busybox".to_string(),
            args: vec!["echo".to_string(), "hi".to_string()],
            name: "job1".to_string(),
            mounts,
            restart_policy: RestartPolicySpec::never(),
            tty: true,
            resources,
        }
    }

    #[tokio::test]
    async fn failed_start_discards_container() {
        let discarded = AtomicBool::new(false);
        let result = discard_on_failure(
            "c1",
            Err(RuntimeError::new(500, "executable not found")),
            async {
                discarded.store(true, Ordering::SeqCst);
                Ok(())
            },
        )
        .await;

        assert_eq!(result, Err(RuntimeError::new(500, "executable not found")));
        assert!(discarded.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cleanup_failure_keeps_start_error() {
        let result = discard_on_failure(
            "c1",
            Err(RuntimeError::new(500, "executable not found")),
            async { Err(RuntimeError::new(404, "no such container")) },
        )
        .await;

        assert_eq!(result.unwrap_err().message, "executable not found");
    }

    #[tokio::test]
    async fn started_container_is_kept() {
        let discarded = AtomicBool::new(false);
        let result = discard_on_failure("c1", Ok(()), async {
            discarded.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await;

        assert!(result.is_ok());
        assert!(!discarded.load(Ordering::SeqCst));
    }

    #[test]
    fn runtime_uses_configured_timeout() {
        let config = ManagerConfig {
            podman_ip_address: "10.0.0.5".to_string(),
            runtime_timeout: Duration::from_secs(9),
            ..Default::default()
        };
        let runtime = PodmanRuntime::new(&config).unwrap();
        assert_eq!(runtime.timeout(), Duration::from_secs(9));
    }

    #[test]
    fn container_config_binds_share_and_never_restarts() {
        let config = container_config(&request(
            vec![MountSpec::share("/data/job1")],
            HashMap::new(),
        ));
        let host = config.host_config.unwrap();

        let mounts = host.mounts.unwrap();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].source.as_deref(), Some("/data/job1"));
        assert_eq!(mounts[0].target.as_deref(), Some("/share"));
        assert_eq!(mounts[0].typ, Some(MountTypeEnum::BIND));
        assert_eq!(mounts[0].read_only, Some(false));

        let policy = host.restart_policy.unwrap();
        assert_eq!(policy.name, Some(RestartPolicyNameEnum::NO));
        assert_eq!(policy.maximum_retry_count, Some(0));

        assert_eq!(config.tty, Some(true));
        assert_eq!(config.cmd.unwrap(), vec!["echo", "hi"]);
    }

    #[test]
    fn resources_translate_to_host_limits() {
        let resources = HashMap::from([
            ("cpu_limit".to_string(), 500),
            ("memory_limit".to_string(), 256),
            ("gpu_limit".to_string(), 1),
        ]);
        let host = container_config(&request(vec![], resources))
            .host_config
            .unwrap();
        assert_eq!(host.nano_cpus, Some(500_000_000));
        assert_eq!(host.memory, Some(256 * 1024 * 1024));
    }

    #[test]
    fn no_resources_means_no_limits() {
        let host = container_config(&request(vec![], HashMap::new()))
            .host_config
            .unwrap();
        assert_eq!(host.nano_cpus, None);
        assert_eq!(host.memory, None);
        assert_eq!(host.mounts, Some(vec![]));
    }

    #[test]
    fn container_states_map_to_task_states() {
        use ContainerStateStatusEnum::*;
        assert_eq!(task_state(&CREATED, None).as_deref(), Some("new"));
        assert_eq!(task_state(&RESTARTING, None).as_deref(), Some("starting"));
        assert_eq!(task_state(&RUNNING, None).as_deref(), Some("running"));
        assert_eq!(task_state(&EXITED, Some(0)).as_deref(), Some("complete"));
        assert_eq!(task_state(&EXITED, Some(2)).as_deref(), Some("failed"));
        assert_eq!(task_state(&DEAD, None).as_deref(), Some("failed"));
        assert_eq!(task_state(&PAUSED, None).as_deref(), Some("paused"));
        assert_eq!(task_state(&EMPTY, None), None);
    }

    #[test]
    fn inspect_response_becomes_task_record() {
        let container = ContainerInspectResponse {
            created: Some("2024-05-01T09:59:59Z".to_string()),
            state: Some(ContainerState {
                status: Some(ContainerStateStatusEnum::EXITED),
                exit_code: Some(0),
                finished_at: Some("2024-05-01T10:00:01Z".to_string()),
                ..Default::default()
            }),
            config: Some(ContainerConfig {
                image: Some("busybox".to_string()),
                cmd: Some(vec!["echo".to_string(), "hi".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let record = task_record(container).unwrap();
        assert_eq!(record.native_state(), "complete");
        assert_eq!(record.spec.container_spec.image, "busybox");
        assert_eq!(record.status.timestamp, "2024-05-01T10:00:01Z");
        assert_eq!(record.status.message, "exited");
    }

    #[test]
    fn missing_state_is_not_observable() {
        assert_eq!(task_record(ContainerInspectResponse::default()), None);
    }
}
