//! Configuration for the watcher.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;

use crate::controller::QuotaBounds;
use crate::runtime::DEFAULT_DOCKER_SOCKET;

/// Which container runtime backs the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    Docker,
    Mock,
}

impl std::str::FromStr for RuntimeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "docker" => Ok(RuntimeKind::Docker),
            "mock" => Ok(RuntimeKind::Mock),
            other => anyhow::bail!("unsupported runtime '{other}' (expected docker or mock)"),
        }
    }
}

/// Watcher configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address.
    pub listen_addr: SocketAddr,

    /// Address of the node this watcher runs on, reported by `/check`.
    pub host_ip: String,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// CPU cores available to function containers.
    pub cores: i64,

    pub bounds: QuotaBounds,

    pub runtime: RuntimeKind,

    /// Path of the Docker daemon socket.
    pub docker_socket: String,

    /// How long shutdown waits for in-flight work.
    pub shutdown_grace: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("SEQCLOCK_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()?;

        let host_ip = std::env::var("HOST_IP").unwrap_or_else(|_| "unknown".to_string());

        let log_level =
            std::env::var("SEQCLOCK_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let cores = match std::env::var("SEQCLOCK_CORES") {
            Ok(v) => v.parse()?,
            Err(_) => detect_cores(),
        };
        if cores <= 0 {
            anyhow::bail!("SEQCLOCK_CORES must be positive, got {cores}");
        }

        let defaults = QuotaBounds::default();
        let bounds = QuotaBounds {
            floor: env_parse("SEQCLOCK_QUOTA_FLOOR", defaults.floor)?,
            throttle_floor: env_parse("SEQCLOCK_THROTTLE_FLOOR", defaults.throttle_floor)?,
        };
        if bounds.floor <= 0 || bounds.throttle_floor <= 0 {
            anyhow::bail!("quota floors must be positive, got {bounds:?}");
        }

        let runtime = std::env::var("SEQCLOCK_RUNTIME")
            .unwrap_or_else(|_| "docker".to_string())
            .parse()?;

        let docker_socket = std::env::var("SEQCLOCK_DOCKER_SOCKET")
            .unwrap_or_else(|_| DEFAULT_DOCKER_SOCKET.to_string());

        let shutdown_grace =
            Duration::from_millis(env_parse("SEQCLOCK_SHUTDOWN_GRACE_MS", 5000u64)?);

        Ok(Self {
            listen_addr,
            host_ip,
            log_level,
            cores,
            bounds,
            runtime,
            docker_socket,
            shutdown_grace,
        })
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(v) => Ok(v.trim().parse()?),
        Err(_) => Ok(default),
    }
}

fn detect_cores() -> i64 {
    std::thread::available_parallelism()
        .map(|p| p.get() as i64)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_kind_parses() {
        assert_eq!("docker".parse::<RuntimeKind>().unwrap(), RuntimeKind::Docker);
        assert_eq!("Mock".parse::<RuntimeKind>().unwrap(), RuntimeKind::Mock);
        assert!("containerd".parse::<RuntimeKind>().is_err());
    }

    #[test]
    fn test_detect_cores() {
        assert!(detect_cores() >= 1);
    }
}
