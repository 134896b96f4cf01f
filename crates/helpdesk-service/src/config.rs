//! Process configuration, parsed once at startup.
//!
//! Flags fall back to environment variables. The resulting [`ServiceConfig`]
//! is shared read-only with every handler; nothing downstream reads the
//! environment again.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use helpdesk_store_sqlite::{StoreConfig, StoreError};

use crate::cors::AllowedOrigins;

pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Parser)]
#[command(name = "helpdesk-service")]
#[command(about = "HTTP service for the helpdesk ticket store")]
pub struct Args {
    #[arg(long, env = "HELPDESK_DB_PATH")]
    pub db: Option<PathBuf>,
    #[arg(long, env = "HELPDESK_BIND", default_value = "127.0.0.1:7071")]
    pub bind: SocketAddr,
    #[arg(long, env = "HELPDESK_POOL_SIZE", default_value_t = 8)]
    pub pool_size: u32,
    #[arg(long, env = "HELPDESK_BUSY_TIMEOUT_MS", default_value_t = 5000)]
    pub busy_timeout_ms: u64,
    #[arg(long, env = "HELPDESK_CONNECT_TIMEOUT_MS", default_value_t = 5000)]
    pub connect_timeout_ms: u64,
    /// Largest accepted request body in bytes.
    #[arg(long, env = "HELPDESK_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,
    /// Comma-separated origins allowed to receive credentialed responses.
    #[arg(long, env = "ALLOWED_ORIGINS", default_value = "")]
    pub allowed_origins: String,
    /// Require the `Agent` role on reply and update endpoints.
    #[arg(long, env = "HELPDESK_REQUIRE_AGENT_ROLE", action = ArgAction::Set, default_value_t = false)]
    pub require_agent_role: bool,
    #[arg(long, env = "HELPDESK_LOG", default_value = "info")]
    pub log: String,
    #[arg(long, env = "HELPDESK_LOG_JSON", action = ArgAction::Set, default_value_t = false)]
    pub log_json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("{0} MUST be greater than zero")]
    Zero(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind: SocketAddr,
    pub store: StoreConfig,
    pub max_body_bytes: usize,
    pub allowed_origins: AllowedOrigins,
    pub require_agent_role: bool,
    pub log_filter: String,
    pub log_json: bool,
}

impl ServiceConfig {
    /// # Errors
    /// Returns [`ConfigError`] when the database path is absent or the store
    /// settings are out of range.
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let database_path = args
            .db
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or(ConfigError::Missing("HELPDESK_DB_PATH"))?;

        let mut store = StoreConfig::new(database_path);
        store.pool_size = args.pool_size;
        store.busy_timeout = Duration::from_millis(args.busy_timeout_ms);
        store.connection_timeout = Duration::from_millis(args.connect_timeout_ms);
        store.validate()?;
        if args.max_body_bytes == 0 {
            return Err(ConfigError::Zero("HELPDESK_MAX_BODY_BYTES"));
        }

        Ok(Self {
            bind: args.bind,
            store,
            max_body_bytes: args.max_body_bytes,
            allowed_origins: AllowedOrigins::parse(&args.allowed_origins),
            require_agent_role: args.require_agent_role,
            log_filter: args.log,
            log_json: args.log_json,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        match Args::try_parse_from(argv) {
            Ok(args) => args,
            Err(err) => panic!("failed to parse args {argv:?}: {err}"),
        }
    }

    #[test]
    fn missing_database_path_fails_fast() {
        let args = Args { db: None, ..parse(&["helpdesk-service", "--db", "x.sqlite3"]) };
        match ServiceConfig::from_args(args) {
            Err(ConfigError::Missing(name)) => assert_eq!(name, "HELPDESK_DB_PATH"),
            other => panic!("expected missing setting error, got {other:?}"),
        }
    }

    #[test]
    fn zero_pool_size_is_a_configuration_error() {
        let args = parse(&["helpdesk-service", "--db", "x.sqlite3", "--pool-size", "0"]);
        assert!(matches!(
            ServiceConfig::from_args(args),
            Err(ConfigError::Store(StoreError::Configuration(_)))
        ));
    }

    #[test]
    fn zero_body_limit_is_rejected() {
        let args = parse(&["helpdesk-service", "--db", "x.sqlite3", "--max-body-bytes", "0"]);
        assert!(matches!(ServiceConfig::from_args(args), Err(ConfigError::Zero(_))));
    }

    #[test]
    fn flags_build_the_service_config() {
        let args = parse(&[
            "helpdesk-service",
            "--db",
            "tickets.sqlite3",
            "--allowed-origins",
            "https://desk.example.com, https://admin.example.com",
            "--require-agent-role",
            "true",
            "--pool-size",
            "2",
        ]);
        let config = match ServiceConfig::from_args(args) {
            Ok(config) => config,
            Err(err) => panic!("expected valid config: {err}"),
        };
        assert_eq!(config.store.database_path, PathBuf::from("tickets.sqlite3"));
        assert_eq!(config.store.pool_size, 2);
        assert_eq!(config.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert!(config.require_agent_role);
        assert!(config.allowed_origins.allows("https://admin.example.com"));
        assert!(!config.allowed_origins.allows("https://evil.example.com"));
    }
}
