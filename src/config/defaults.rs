//! Default configuration values
//!
//! Single source of truth for defaults, shared by serde and the CLI help text.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::common::RELAY_BUFFER_SIZE;
use crate::relay::HALF_CLOSE_TIMEOUT;
use crate::socks5::HANDSHAKE_TIMEOUT;

/// Environment variable prefix for all configuration options
pub const ENV_PREFIX: &str = "SOCKS_TUN";

/// Environment variable naming the configuration file
pub const CONFIG_FILE_ENV: &str = "SOCKS_TUN_CONFIG_FILE";

/// Default proxy address
pub const PROXY_STR: &str = "127.0.0.1:1080";

/// Default interface name
pub const INTERFACE_NAME_STR: &str = "socks-tun0";

/// Default interface address
pub const INTERFACE_ADDRESS_STR: &str = "192.168.124.1/24";

/// Default port the interface bridge connects to
pub const INTERFACE_LISTEN_PORT: u16 = 7070;

/// Default log level
pub const LOG_LEVEL_STR: &str = "info";

pub fn proxy() -> String {
    PROXY_STR.to_string()
}

pub fn interface_name() -> String {
    INTERFACE_NAME_STR.to_string()
}

pub fn interface_address() -> String {
    INTERFACE_ADDRESS_STR.to_string()
}

pub fn interface_listen() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), INTERFACE_LISTEN_PORT)
}

pub fn handshake_timeout() -> Duration {
    HANDSHAKE_TIMEOUT
}

pub fn half_close_timeout() -> Duration {
    HALF_CLOSE_TIMEOUT
}

pub fn buffer_size() -> usize {
    RELAY_BUFFER_SIZE
}

pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}
