//! Job scheduling on top of a container runtime.
//!
//! A [`manager::JobManager`] schedules short-lived containerized jobs, reports
//! their lifecycle in a small uniform vocabulary, fetches their logs and
//! removes them. Backends (`PodmanManager`, `SwarmManager`) talk to the runtime
//! through a [`tasks::types::RuntimeClient`].

pub mod config;
pub mod manager;
pub mod tasks;
