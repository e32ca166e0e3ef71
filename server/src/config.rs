use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Real-time matrix collaboration server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(
    name = "matrix-collab-server",
    version,
    about = "Real-time matrix collaboration server"
)]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "MATRIX_COLLAB_PORT", default_value = "3030")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "MATRIX_COLLAB_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./matrix-collab.toml")]
    pub config: String,

    /// Enable structured JSON logging
    #[arg(long, env = "MATRIX_COLLAB_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, keys)
    #[arg(long, env = "MATRIX_COLLAB_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Idle detection and heartbeat settings ([presence] section in TOML)
    #[arg(skip)]
    #[serde(default)]
    pub presence: Option<PresenceConfig>,

    /// Algebra limits ([algebra] section in TOML)
    #[arg(skip)]
    #[serde(default)]
    pub algebra: Option<AlgebraConfig>,
}

/// Connection liveness settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Seconds without application traffic before a connection is reaped (default: 1800)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Seconds between idle sweeps (default: 300)
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,

    /// Seconds between protocol-level pings (default: 30)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Seconds to wait for a pong before dropping the connection (default: 10)
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 1800,
            reap_interval_secs: 300,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 10,
        }
    }
}

fn default_idle_timeout() -> u64 {
    1800
}

fn default_reap_interval() -> u64 {
    300
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_heartbeat_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgebraConfig {
    /// Largest n for which an n x n determinant is computed (default: 10)
    #[serde(default = "default_max_determinant_dimension")]
    pub max_determinant_dimension: usize,
}

impl Default for AlgebraConfig {
    fn default() -> Self {
        Self {
            max_determinant_dimension: 10,
        }
    }
}

fn default_max_determinant_dimension() -> usize {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3030,
            bind_address: "0.0.0.0".to_string(),
            config: "./matrix-collab.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            presence: Some(PresenceConfig::default()),
            algebra: Some(AlgebraConfig::default()),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (MATRIX_COLLAB_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("MATRIX_COLLAB_").split("__"))
            .merge(Serialized::defaults(cli))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would stall or panic the background tasks.
    pub fn validate(&self) -> Result<(), figment::Error> {
        if let Some(presence) = &self.presence {
            let fields = [
                ("idle_timeout_secs", presence.idle_timeout_secs),
                ("reap_interval_secs", presence.reap_interval_secs),
                ("heartbeat_interval_secs", presence.heartbeat_interval_secs),
                ("heartbeat_timeout_secs", presence.heartbeat_timeout_secs),
            ];
            for (name, value) in fields {
                if value == 0 {
                    return Err(figment::Error::from(format!(
                        "presence.{} must be greater than zero",
                        name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Matrix Collaboration Server Configuration
# Place this file at ./matrix-collab.toml or specify with --config <path>
# All settings can be overridden via environment variables (MATRIX_COLLAB_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 3030)
# port = 3030

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging
# json_logs = false

# Data directory for SQLite database and JWT signing key
# data_dir = "./data"

# ---- Presence ----
# [presence]

# Connections with no application traffic for this long are disconnected (default: 1800 = 30 minutes)
# idle_timeout_secs = 1800

# How often the idle sweep runs (default: 300 = 5 minutes)
# reap_interval_secs = 300

# WebSocket ping cadence and pong deadline
# heartbeat_interval_secs = 30
# heartbeat_timeout_secs = 10

# ---- Algebra ----
# [algebra]

# Determinant uses cofactor expansion; larger matrices are rejected (default: 10)
# max_determinant_dimension = 10
"#
    .to_string()
}
