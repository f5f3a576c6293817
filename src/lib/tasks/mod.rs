pub mod memory;
pub mod podman;
pub mod state;
pub mod swarm;
pub mod types;
