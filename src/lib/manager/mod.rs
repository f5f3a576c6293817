pub mod manager;
pub mod podman;
pub mod swarm;
pub mod types;

pub use manager::new_manager;
pub use podman::PodmanManager;
pub use swarm::SwarmManager;
pub use types::{JobHandle, JobInfo, JobManager, JobSpec, ManagerError, ManagerResult};
