use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub mqtt: Option<MqttConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Host name or IP of the ISG, optionally with an http:// prefix
    pub host: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Check the HTML document title at startup to confirm the host is an ISG
    #[serde(default = "default_true")]
    pub verify_title: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Consecutive failed cycles before the snapshot is flagged stale
    #[serde(default = "default_stale_after")]
    pub stale_after_cycles: u32,
    /// A daily counter dropping by more than this many kWh between polls is
    /// logged as a possible counter wrap or manual device reset
    #[serde(default = "default_anomaly_kwh")]
    pub counter_anomaly_kwh: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            stale_after_cycles: default_stale_after(),
            counter_anomaly_kwh: default_anomaly_kwh(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Where the lifetime counter totals are persisted across restarts
    #[serde(default = "default_state_path")]
    pub path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_qos")]
    pub qos: u8,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

fn default_timeout_secs() -> u64 {
    15
}
fn default_true() -> bool {
    true
}
fn default_interval_secs() -> u64 {
    60
}
fn default_stale_after() -> u32 {
    3
}
fn default_anomaly_kwh() -> f64 {
    100.0
}
fn default_state_path() -> String {
    "data/counter-state.json".into()
}
fn default_topic() -> String {
    "stiebel_isg/telemetry".into()
}
fn default_qos() -> u8 {
    1
}
fn default_keep_alive_secs() -> u64 {
    30
}

impl Config {
    /// Load configuration from a YAML file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        // Expand environment variables in the format $(VAR_NAME)
        let expanded = expand_env_vars(&content);

        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.gateway.host.is_empty() {
            return Err(AppError::Config("Gateway host cannot be empty".to_string()));
        }

        if self.gateway.username.is_some() != self.gateway.password.is_some() {
            return Err(AppError::Config(
                "Gateway username and password must be provided together".to_string(),
            ));
        }

        if self.gateway.timeout_secs == 0 {
            return Err(AppError::Config(
                "Gateway timeout cannot be 0 seconds".to_string(),
            ));
        }

        if self.poll.interval_secs == 0 {
            return Err(AppError::Config(
                "Poll interval cannot be 0 seconds".to_string(),
            ));
        }

        if self.poll.stale_after_cycles == 0 {
            return Err(AppError::Config(
                "stale_after_cycles must be at least 1".to_string(),
            ));
        }

        if self.poll.counter_anomaly_kwh <= 0.0 {
            return Err(AppError::Config(
                "counter_anomaly_kwh must be positive".to_string(),
            ));
        }

        if self.state.path.is_empty() {
            return Err(AppError::Config("State path cannot be empty".to_string()));
        }

        if let Some(mqtt) = &self.mqtt {
            if mqtt.host.is_empty() {
                return Err(AppError::Config("MQTT host cannot be empty".to_string()));
            }
            if mqtt.topic.is_empty() {
                return Err(AppError::Config("MQTT topic cannot be empty".to_string()));
            }
            if mqtt.qos > 2 {
                return Err(AppError::Config(format!(
                    "MQTT QoS must be 0, 1 or 2, got {}",
                    mqtt.qos
                )));
            }
        }

        Ok(())
    }
}

/// Expand environment variables in the format $(VAR_NAME)
fn expand_env_vars(content: &str) -> String {
    let mut result = content.to_string();

    let re = regex::Regex::new(r"\$\(([A-Z_][A-Z0-9_]*)\)").unwrap();

    for cap in re.captures_iter(content) {
        let full_match = &cap[0];
        let var_name = &cap[1];

        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(full_match, &value);
        }
    }

    result
}
