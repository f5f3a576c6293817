use std::{error::Error, time::Duration};

use clap::{Parser, Subcommand};
use pman::{
    config::ManagerConfig,
    manager::{JobManager, JobSpec, ManagerError, new_manager},
    tasks::state::valid_status_transition,
};
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "pman", version, about = "Schedule short-lived jobs on a container runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Schedule a new job
    Run {
        #[arg(long)]
        image: String,
        /// Command line, split on whitespace
        #[arg(long)]
        command: String,
        /// Job name; generated when omitted
        #[arg(long)]
        name: Option<String>,
        /// Host directory bound read-write at /share
        #[arg(long)]
        mount_dir: Option<String>,
        /// Resource limit, e.g. cpu_limit=1000 or memory_limit=512
        #[arg(long = "resource", value_parser = parse_resource)]
        resources: Vec<(String, u64)>,
    },
    /// Print a job's info as JSON
    Status { name: String },
    /// Print a job's logs
    Logs { name: String },
    /// Poll a job until it finishes
    Wait {
        name: String,
        #[arg(long, default_value_t = 2)]
        interval_secs: u64,
    },
    /// Remove a job
    Rm { name: String },
}

fn parse_resource(raw: &str) -> Result<(String, u64), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let quantity = value
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid quantity for {key}: {e}"))?;
    Ok((key.trim().to_string(), quantity))
}

async fn execute(manager: &dyn JobManager, command: Command) -> Result<(), ManagerError> {
    match command {
        Command::Run {
            image,
            command,
            name,
            mount_dir,
            resources,
        } => {
            let name = name.unwrap_or_else(|| format!("job-{}", uuid::Uuid::new_v4().simple()));
            let mut spec = JobSpec::new(image, command, name);
            spec.mount_dir = mount_dir;
            spec.resources.extend(resources);

            let job = manager.schedule(&spec).await?;
            println!("{}", to_json(&job));
        }
        Command::Status { name } => {
            let job = manager.fetch(&name).await?;
            println!("{}", to_json(&manager.inspect(&job).await?));
        }
        Command::Logs { name } => {
            let job = manager.fetch(&name).await?;
            print!("{}", manager.get_logs(&job).await?);
        }
        Command::Wait {
            name,
            interval_secs,
        } => {
            let job = manager.fetch(&name).await?;
            let mut last = manager.inspect(&job).await?;
            while !last.status.is_terminal() {
                tokio::time::sleep(Duration::from_secs(interval_secs)).await;
                let info = manager.inspect(&job).await?;
                if !valid_status_transition(&last.status, &info.status) {
                    warn!(from = %last.status, to = %info.status, "unexpected status change");
                }
                last = info;
            }
            println!("{}", to_json(&last));
        }
        Command::Rm { name } => {
            let job = manager.fetch(&name).await?;
            manager.remove(&job).await?;
        }
    }
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ManagerConfig::from_env()?;
    let manager = new_manager(&config)?;

    if let Err(err) = execute(manager.as_ref(), cli.command).await {
        eprintln!("error {}: {}", err.status_code, err.message);
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_flags_parse() {
        assert_eq!(
            parse_resource("memory_limit=512"),
            Ok(("memory_limit".to_string(), 512))
        );
        assert!(parse_resource("cpu_limit").is_err());
        assert!(parse_resource("cpu_limit=lots").is_err());
    }

    #[test]
    fn cli_accepts_run_with_resources() {
        let cli = Cli::try_parse_from([
            "pman",
            "run",
            "--image",
            "busybox",
            "--command",
            "echo hi",
            "--resource",
            "cpu_limit=500",
            "--mount-dir",
            "/tmp/in",
        ])
        .unwrap();

        match cli.command {
            Command::Run {
                resources,
                mount_dir,
                name,
                ..
            } => {
                assert_eq!(resources, vec![("cpu_limit".to_string(), 500)]);
                assert_eq!(mount_dir.as_deref(), Some("/tmp/in"));
                assert_eq!(name, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
