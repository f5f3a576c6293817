//! Runtime connection settings.

use std::{fmt, str::FromStr, time::Duration};

/// Which container runtime backs the manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContainerEnv {
    #[default]
    Podman,
    Swarm,
}

impl FromStr for ContainerEnv {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "podman" => Ok(ContainerEnv::Podman),
            "swarm" => Ok(ContainerEnv::Swarm),
            other => Err(ConfigError::InvalidValue {
                key: "CONTAINER_ENV".to_string(),
                message: format!("unknown container environment '{other}'"),
            }),
        }
    }
}

impl fmt::Display for ContainerEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerEnv::Podman => write!(f, "podman"),
            ContainerEnv::Swarm => write!(f, "swarm"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Manager configuration, built once and handed to [`crate::manager::new_manager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub container_env: ContainerEnv,
    /// Address of the Podman REST service.
    pub podman_ip_address: String,
    pub podman_tcp_port: u16,
    /// Client-side timeout for every runtime call.
    pub runtime_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            container_env: ContainerEnv::Podman,
            podman_ip_address: "127.0.0.1".to_string(),
            podman_tcp_port: 8080,
            runtime_timeout: Duration::from_secs(120),
        }
    }
}

impl ManagerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(env) = lookup("CONTAINER_ENV") {
            config.container_env = env.parse()?;
        }
        if let Some(address) = lookup("PODMAN_IP_ADDRESS") {
            config.podman_ip_address = address;
        }
        if let Some(port) = lookup("PODMAN_TCP_PORT") {
            config.podman_tcp_port = parse_number("PODMAN_TCP_PORT", &port)?;
        }
        if let Some(secs) = lookup("PMAN_RUNTIME_TIMEOUT_SECS") {
            config.runtime_timeout =
                Duration::from_secs(parse_number("PMAN_RUNTIME_TIMEOUT_SECS", &secs)?);
        }

        Ok(config)
    }

    pub fn podman_url(&self) -> String {
        format!("tcp://{}:{}", self.podman_ip_address, self.podman_tcp_port)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{value}': {e}"),
        })
}
