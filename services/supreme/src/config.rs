//! Configuration for the coordinator.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;

use crate::coordinator::DispatchPolicy;

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address.
    pub listen_addr: SocketAddr,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Watcher nodes, in broadcast order. Each is `host` or `host:port`.
    pub watcher_nodes: Vec<String>,

    /// Port used for nodes listed without one.
    pub watcher_port: u16,

    pub dispatch: DispatchPolicy,

    /// Per-RPC timeout towards watchers.
    pub rpc_timeout: Duration,

    /// How long shutdown waits for in-flight work.
    pub shutdown_grace: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("SEQCLOCK_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()?;

        let log_level =
            std::env::var("SEQCLOCK_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let watcher_nodes =
            parse_nodes(&std::env::var("SEQCLOCK_WATCHER_NODES").unwrap_or_default());
        if watcher_nodes.is_empty() {
            anyhow::bail!("SEQCLOCK_WATCHER_NODES must list at least one watcher");
        }

        let watcher_port = env_parse("SEQCLOCK_WATCHER_PORT", 8080u16)?;

        let defaults = DispatchPolicy::default();
        let dispatch = DispatchPolicy {
            max_attempts: env_parse("SEQCLOCK_DISPATCH_MAX_ATTEMPTS", defaults.max_attempts)?,
            backoff: Duration::from_millis(env_parse(
                "SEQCLOCK_DISPATCH_BACKOFF_MS",
                defaults.backoff.as_millis() as u64,
            )?),
            failed_ttl: Duration::from_millis(env_parse(
                "SEQCLOCK_FAILED_TTL_MS",
                defaults.failed_ttl.as_millis() as u64,
            )?),
        };
        if dispatch.max_attempts == 0 {
            anyhow::bail!("SEQCLOCK_DISPATCH_MAX_ATTEMPTS must be at least 1");
        }

        let rpc_timeout = Duration::from_millis(env_parse("SEQCLOCK_RPC_TIMEOUT_MS", 5000u64)?);

        let shutdown_grace =
            Duration::from_millis(env_parse("SEQCLOCK_SHUTDOWN_GRACE_MS", 5000u64)?);

        Ok(Self {
            listen_addr,
            log_level,
            watcher_nodes,
            watcher_port,
            dispatch,
            rpc_timeout,
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

fn parse_nodes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|node| !node.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nodes() {
        assert_eq!(
            parse_nodes("192.168.1.244, 192.168.1.245:9000,,"),
            vec!["192.168.1.244", "192.168.1.245:9000"]
        );
        assert!(parse_nodes("").is_empty());
        assert!(parse_nodes(" , ").is_empty());
    }
}
