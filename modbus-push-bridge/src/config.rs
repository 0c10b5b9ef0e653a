//! Configuration for the Modbus push bridge.

use std::time::Duration;

use modbus_push_framework::{BridgeConfig, BridgeError, LoggingConfig};
use serde::{Deserialize, Serialize};

use crate::notifier::{NotifyError, WebhookTarget};
use crate::session::ConnectRequest;

/// Upper bound on the number of polled registers.
pub const MAX_REGISTERS: usize = 4;

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusPushConfig {
    /// Modbus device settings
    pub modbus: ModbusConfig,

    /// Webhook settings
    pub webhook: WebhookConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Modbus device and polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusConfig {
    /// Host address (IP or hostname)
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port (default: 502)
    #[serde(default = "default_modbus_port")]
    pub port: u16,

    /// Modbus unit/slave ID (1-247)
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Register addresses to watch (1-4 entries)
    pub registers: Vec<u16>,

    /// Poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Connect and read timeout in milliseconds. Absent means no timeout.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Notify on every tick while a register reads nonzero, in addition to
    /// change notifications.
    #[serde(default = "default_repeat_nonzero")]
    pub repeat_nonzero: bool,
}

fn default_host() -> String {
    "192.168.0.88".to_string()
}

fn default_modbus_port() -> u16 {
    502
}

fn default_unit_id() -> u8 {
    1
}

fn default_poll_interval() -> u64 {
    1
}

fn default_repeat_nonzero() -> bool {
    true
}

/// Webhook configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Webhook URL
    pub url: String,

    /// Request timeout in milliseconds. Absent means no timeout.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ModbusConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl WebhookConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl ModbusPushConfig {
    /// Build the connect request for this configuration.
    pub fn connect_request(&self) -> Result<ConnectRequest, NotifyError> {
        Ok(ConnectRequest {
            host: self.modbus.host.trim().to_string(),
            port: self.modbus.port,
            addresses: self.modbus.registers.clone(),
            webhook: WebhookTarget::new(&self.webhook.url)?,
        })
    }
}

impl BridgeConfig for ModbusPushConfig {
    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn validate(&self) -> Result<(), BridgeError> {
        let modbus = &self.modbus;

        if modbus.host.trim().is_empty() {
            return Err(BridgeError::validation("modbus.host cannot be empty"));
        }

        if modbus.port == 0 {
            return Err(BridgeError::validation("modbus.port must be 1-65535"));
        }

        if modbus.unit_id == 0 || modbus.unit_id > 247 {
            return Err(BridgeError::validation(format!(
                "modbus.unit_id must be 1-247, got {}",
                modbus.unit_id
            )));
        }

        if modbus.registers.is_empty() {
            return Err(BridgeError::validation(
                "At least one register address must be configured",
            ));
        }

        if modbus.registers.len() > MAX_REGISTERS {
            return Err(BridgeError::validation(format!(
                "At most {} register addresses are supported, got {}",
                MAX_REGISTERS,
                modbus.registers.len()
            )));
        }

        if modbus.poll_interval_secs == 0 {
            return Err(BridgeError::validation(
                "modbus.poll_interval_secs must be at least 1",
            ));
        }

        if self.webhook.url.trim().is_empty() {
            return Err(BridgeError::validation("webhook.url cannot be empty"));
        }

        Ok(())
    }
}
