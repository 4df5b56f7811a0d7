//! Relay configuration
//!
//! Everything comes from the environment with workable local defaults,
//! the same knobs the deployment scripts have always set: broker
//! address and credentials, topic names, database URL, HTTP port.

use std::env;
use std::fmt::Debug;
use std::str::FromStr;

/// Root configuration for the relay process
#[derive(Debug, Clone)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub database: DatabaseConfig,
    pub http: HttpConfig,
}

/// Broker link settings
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// Broker hostname
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Optional username credential
    pub username: Option<String>,
    /// Optional password credential
    pub password: Option<String>,
    /// Topic the device publishes telemetry on; commands arrive on
    /// `<data_topic>/command`
    pub data_topic: String,
    /// Topic the relay publishes device commands on
    pub command_publish_topic: String,
    /// Client id presented to the broker
    pub client_id: String,
}

impl MqttConfig {
    /// Topic the relay listens on for inbound command messages
    pub fn command_subscribe_topic(&self) -> String {
        format!("{}/command", self.data_topic)
    }
}

/// Persistence settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
}

/// HTTP/WebSocket listener settings
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Port the dashboard API listens on
    pub port: u16,
}

impl Config {
    /// Load configuration from the environment, falling back to local
    /// development defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            mqtt: MqttConfig {
                host: env_or("MQTT_BROKER", "localhost"),
                port: parse_env_or("MQTT_PORT", 1883),
                username: non_empty(env::var("MQTT_USERNAME").ok()),
                password: non_empty(env::var("MQTT_PASSWORD").ok()),
                data_topic: env_or("MQTT_TOPIC", "monitor/hiu-paus/data"),
                command_publish_topic: env_or("MQTT_COMMAND_TOPIC", "monitor/hiu-paus/command"),
                client_id: format!("server_{:08x}", std::process::id()),
            },
            database: DatabaseConfig {
                url: env_or("DATABASE_URL", "postgres://localhost/hiu_paus"),
            },
            http: HttpConfig {
                port: parse_env_or("PORT", 3000),
            },
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_owned())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Parse an environment variable, keeping the default when the value is
/// missing or malformed. A typo in a port number should not take the
/// relay down.
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Debug,
{
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("ignoring unparsable {key}={raw:?}, using {default:?}");
                default
            }
        },
        Err(_) => default,
    }
}
