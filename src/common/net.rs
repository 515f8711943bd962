//! Network utility functions
//!
//! This module provides utility functions for network addresses.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use super::error::{SocksTunError, Result};

/// Parse a socket address
///
/// # Arguments
///
/// * `addr` - The address string to parse
///
/// # Returns
///
/// The parsed `SocketAddr`
pub fn parse_socket_addr(addr: &str) -> Result<SocketAddr> {
    // Try direct parsing first
    if let Ok(socket_addr) = SocketAddr::from_str(addr) {
        return Ok(socket_addr);
    }

    match addr.to_socket_addrs() {
        Ok(mut addrs) => addrs
            .next()
            .ok_or_else(|| SocksTunError::Config(format!("Failed to parse address: {}", addr))),
        Err(e) => Err(SocksTunError::Config(format!("Failed to parse address {}: {}", addr, e))),
    }
}

/// Split a `host:port` endpoint without resolving it
///
/// Bracketed IPv6 literals (`[::1]:1080`) are accepted. The host part must
/// not be empty and the port must be a valid `u16`.
pub fn split_host_port(addr: &str) -> Result<(&str, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| SocksTunError::Config(format!("Address '{}' is not in host:port form", addr)))?;

    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if host.is_empty() {
        return Err(SocksTunError::Config(format!("Address '{}' has an empty host", addr)));
    }

    let port = port
        .parse::<u16>()
        .map_err(|e| SocksTunError::Config(format!("Invalid port in '{}': {}", addr, e)))?;

    Ok((host, port))
}

/// Parse an interface address in CIDR notation (`192.168.124.1/24`)
pub fn parse_cidr(cidr: &str) -> Result<(IpAddr, u8)> {
    let (ip, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| SocksTunError::Config(format!("'{}' is not in address/prefix form", cidr)))?;

    let ip = IpAddr::from_str(ip)
        .map_err(|e| SocksTunError::Config(format!("Invalid interface address '{}': {}", cidr, e)))?;
    let prefix = prefix
        .parse::<u8>()
        .map_err(|e| SocksTunError::Config(format!("Invalid prefix length in '{}': {}", cidr, e)))?;

    let max_prefix = if ip.is_ipv4() { 32 } else { 128 };
    if prefix > max_prefix {
        return Err(SocksTunError::Config(format!(
            "Prefix length {} exceeds {} for '{}'",
            prefix, max_prefix, cidr
        )));
    }

    Ok((ip, prefix))
}
