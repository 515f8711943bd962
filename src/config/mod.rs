//! Configuration module
//!
//! This module handles application configuration: built-in defaults, an
//! optional JSON file, `SOCKS_TUN_*` environment variables and command line
//! overrides, in increasing order of priority.

mod defaults;
mod loader;
mod validator;

pub use self::defaults::{CONFIG_FILE_ENV, ENV_PREFIX};
pub use self::validator::ConfigValidator;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::common::Result;
use crate::socks5::{Credentials, MethodPolicy};

/// Tunnel configuration
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TunnelConfig {
    /// SOCKS5 proxy address (`host:port`)
    pub proxy: String,

    /// Proxy username
    pub username: String,

    /// Proxy password
    pub password: String,

    /// Name of the virtual interface owned by the bridge
    pub interface_name: String,

    /// CIDR the virtual interface is configured with
    pub interface_address: String,

    /// Address the interface bridge connects to
    pub interface_listen: SocketAddr,

    /// Deadline for the SOCKS5 handshake, in seconds
    #[serde(with = "seconds")]
    pub handshake_timeout: Duration,

    /// Read deadline armed once the opposite direction has finished, in seconds
    #[serde(with = "seconds")]
    pub half_close_timeout: Duration,

    /// Optional bound on the whole relay, in seconds
    #[serde(with = "optional_seconds")]
    pub relay_timeout: Option<Duration>,

    /// Relay buffer size in bytes
    pub buffer_size: usize,

    /// Reject proxies that pick a method other than username/password
    pub strict_method_check: bool,

    /// Log level
    pub log_level: String,

    /// File the configuration was loaded from
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            proxy: defaults::proxy(),
            username: String::new(),
            password: String::new(),
            interface_name: defaults::interface_name(),
            interface_address: defaults::interface_address(),
            interface_listen: defaults::interface_listen(),
            handshake_timeout: defaults::handshake_timeout(),
            half_close_timeout: defaults::half_close_timeout(),
            relay_timeout: None,
            buffer_size: defaults::buffer_size(),
            strict_method_check: false,
            log_level: defaults::log_level(),
            config_file: None,
        }
    }
}

impl std::fmt::Debug for TunnelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelConfig")
            .field("proxy", &self.proxy)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("interface_name", &self.interface_name)
            .field("interface_address", &self.interface_address)
            .field("interface_listen", &self.interface_listen)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("half_close_timeout", &self.half_close_timeout)
            .field("relay_timeout", &self.relay_timeout)
            .field("buffer_size", &self.buffer_size)
            .field("strict_method_check", &self.strict_method_check)
            .field("log_level", &self.log_level)
            .field("config_file", &self.config_file)
            .finish()
    }
}

/// Command line overrides
///
/// Every `Some` replaces the loaded value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub proxy: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub interface_name: Option<String>,
    pub interface_address: Option<String>,
    pub interface_listen: Option<SocketAddr>,
    pub log_level: Option<String>,
    pub strict_method_check: Option<bool>,
}

impl TunnelConfig {
    /// Apply command line overrides on top of the loaded values
    pub fn merge(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(proxy) = overrides.proxy {
            self.proxy = proxy;
        }
        if let Some(username) = overrides.username {
            self.username = username;
        }
        if let Some(password) = overrides.password {
            self.password = password;
        }
        if let Some(name) = overrides.interface_name {
            self.interface_name = name;
        }
        if let Some(address) = overrides.interface_address {
            self.interface_address = address;
        }
        if let Some(listen) = overrides.interface_listen {
            self.interface_listen = listen;
        }
        if let Some(level) = overrides.log_level {
            self.log_level = level;
        }
        if let Some(strict) = overrides.strict_method_check {
            self.strict_method_check = strict;
        }
        self
    }

    /// Proxy credentials
    pub fn credentials(&self) -> Result<Credentials> {
        Ok(Credentials::new(self.username.as_str(), self.password.as_str())?)
    }

    /// Method policy derived from `strict_method_check`
    pub fn method_policy(&self) -> MethodPolicy {
        if self.strict_method_check {
            MethodPolicy::Strict
        } else {
            MethodPolicy::Lenient
        }
    }

    /// Log the effective configuration, password redacted
    pub fn log(&self) {
        info!("Configuration:");
        if let Some(path) = &self.config_file {
            info!("  Loaded from: {}", path.display());
        }
        info!("  Proxy: {}", self.proxy);
        info!("  Username: {}", self.username);
        info!("  Password: {}", redact(&self.password));
        info!(
            "  Interface: {} ({}), bridge on {}",
            self.interface_name, self.interface_address, self.interface_listen
        );
        info!("  Handshake timeout: {:?}", self.handshake_timeout);
        info!("  Half-close timeout: {:?}", self.half_close_timeout);
        match self.relay_timeout {
            Some(timeout) => info!("  Relay timeout: {:?}", timeout),
            None => info!("  Relay timeout: none"),
        }
        info!("  Buffer size: {} bytes", self.buffer_size);
        info!("  Strict method check: {}", self.strict_method_check);
        info!("  Log level: {}", self.log_level);
    }

    /// JSON rendering with the password redacted
    pub fn to_redacted_json(&self) -> Result<String> {
        let mut shown = self.clone();
        shown.password = redact(&self.password).to_string();
        serde_json::to_string_pretty(&shown)
            .map_err(|e| crate::common::SocksTunError::Config(e.to_string()))
    }
}

fn redact(password: &str) -> &'static str {
    if password.is_empty() {
        "(none)"
    } else {
        "********"
    }
}

mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod optional_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TunnelConfig::default();
        assert_eq!(config.proxy, "127.0.0.1:1080");
        assert_eq!(config.interface_address, "192.168.124.1/24");
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
        assert_eq!(config.half_close_timeout, Duration::from_secs(60));
        assert_eq!(config.relay_timeout, None);
        assert_eq!(config.buffer_size, 20 * 1024);
        assert_eq!(config.method_policy(), MethodPolicy::Lenient);
    }

    #[test]
    fn test_merge_overrides() {
        let config = TunnelConfig::default().merge(ConfigOverrides {
            proxy: Some("proxy.example:9050".to_string()),
            password: Some("hunter2".to_string()),
            strict_method_check: Some(true),
            ..Default::default()
        });

        assert_eq!(config.proxy, "proxy.example:9050");
        assert_eq!(config.password, "hunter2");
        assert_eq!(config.username, "");
        assert_eq!(config.method_policy(), MethodPolicy::Strict);
    }

    #[test]
    fn test_password_redacted() {
        let mut config = TunnelConfig::default();
        config.password = "hunter2".to_string();

        assert!(!format!("{:?}", config).contains("hunter2"));
        let json = config.to_redacted_json().unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("\"handshake_timeout\": 10"));
    }

    #[test]
    fn test_deserialize_partial_json() {
        let config: TunnelConfig =
            serde_json::from_str(r#"{"proxy": "10.0.0.1:1080", "relay_timeout": 300}"#).unwrap();
        assert_eq!(config.proxy, "10.0.0.1:1080");
        assert_eq!(config.relay_timeout, Some(Duration::from_secs(300)));
        assert_eq!(config.interface_name, "socks-tun0");
    }
}
