use tracing::{info, warn};

use super::{
    podman::PodmanManager,
    swarm::SwarmManager,
    types::{JobManager, JobSpec, ManagerError, ManagerResult},
};
use crate::{
    config::{ContainerEnv, ManagerConfig},
    tasks::{
        podman::PodmanRuntime,
        swarm::SwarmRuntime,
        types::{CreateRequest, MountSpec, RestartPolicySpec, RuntimeError},
    },
};

/// Connect to the configured runtime and return its manager.
pub fn new_manager(config: &ManagerConfig) -> ManagerResult<Box<dyn JobManager>> {
    info!(backend = %config.container_env, "creating job manager");
    let manager: Box<dyn JobManager> = match config.container_env {
        ContainerEnv::Podman => {
            Box::new(PodmanManager::new(PodmanRuntime::new(config).map_err(runtime_error)?))
        }
        ContainerEnv::Swarm => {
            Box::new(SwarmManager::new(SwarmRuntime::new(config).map_err(runtime_error)?))
        }
    };
    Ok(manager)
}

/// Runtime failure seen by any operation other than a name lookup. A runtime
/// that errored internally, or gave no code at all, is reported as unavailable.
pub fn runtime_error(err: RuntimeError) -> ManagerError {
    let status_code = match err.status_code {
        None | Some(500) => 503,
        Some(code) => code,
    };
    warn!(status_code, runtime_code = ?err.status_code, error = %err.message, "runtime call failed");
    ManagerError::new(err.message, status_code)
}

/// Failure while resolving a job by name.
pub fn lookup_error(err: RuntimeError) -> ManagerError {
    warn!(runtime_code = ?err.status_code, error = %err.message, "job lookup failed");
    ManagerError::bad_request(err.message)
}

/// Validate a job spec and turn it into the runtime's create request.
pub fn create_request(spec: &JobSpec) -> ManagerResult<CreateRequest> {
    if spec.image.trim().is_empty() {
        return Err(ManagerError::bad_request("job image must not be empty"));
    }
    if spec.name.trim().is_empty() {
        return Err(ManagerError::bad_request("job name must not be empty"));
    }
    let args = spec.args();
    if args.is_empty() {
        return Err(ManagerError::bad_request("job command must not be empty"));
    }

    Ok(CreateRequest {
        image: spec.image.clone(),
        args,
        name: spec.name.clone(),
        mounts: spec.mount_dir.iter().map(MountSpec::share).collect(),
        restart_policy: RestartPolicySpec::never(),
        tty: true,
        resources: spec.resources.clone(),
    })
}
