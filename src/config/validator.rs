//! Configuration validator
//!
//! This module provides functionality for validating configuration.

use log::warn;

use crate::common::{parse_cidr, split_host_port, Result, SocksTunError};
use crate::config::TunnelConfig;
use crate::socks5::MAX_CREDENTIAL_LEN;

/// Trait for validating configuration
pub trait ConfigValidator {
    /// Validate configuration
    ///
    /// Returns an error if the configuration cannot be used.
    fn validate(&self) -> Result<()>;

    /// Check configuration for potential issues
    ///
    /// Unlike `validate()`, this does not fail; it returns the warnings.
    fn check_warnings(&self) -> Vec<String>;
}

impl ConfigValidator for TunnelConfig {
    fn validate(&self) -> Result<()> {
        validate_network_settings(self)?;
        validate_credentials(self)?;
        validate_general_settings(self)?;

        for warning in self.check_warnings() {
            warn!("{}", warning);
        }

        Ok(())
    }

    fn check_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        match self.log_level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            level => {
                warnings.push(format!("Invalid log level '{}', using default 'info'", level));
            }
        }

        if self.username.is_empty() && self.password.is_empty() {
            warnings.push("No proxy credentials configured, sending empty username and password".to_string());
        }

        warnings
    }
}

/// Validate network settings
fn validate_network_settings(config: &TunnelConfig) -> Result<()> {
    split_host_port(&config.proxy)?;
    parse_cidr(&config.interface_address)?;

    if config.interface_name.is_empty() {
        return Err(SocksTunError::Config("Interface name must not be empty".to_string()));
    }

    Ok(())
}

/// Validate credential lengths
fn validate_credentials(config: &TunnelConfig) -> Result<()> {
    for (field, value) in [("username", &config.username), ("password", &config.password)] {
        if value.len() > MAX_CREDENTIAL_LEN {
            return Err(SocksTunError::Config(format!(
                "{} is {} bytes, at most {} allowed",
                field,
                value.len(),
                MAX_CREDENTIAL_LEN
            )));
        }
    }

    Ok(())
}

/// Validate general settings
fn validate_general_settings(config: &TunnelConfig) -> Result<()> {
    if config.buffer_size == 0 {
        return Err(SocksTunError::Config("Buffer size must be greater than 0".to_string()));
    }

    if config.handshake_timeout.is_zero() {
        return Err(SocksTunError::Config("Handshake timeout must be greater than 0".to_string()));
    }

    if config.half_close_timeout.is_zero() {
        return Err(SocksTunError::Config("Half-close timeout must be greater than 0".to_string()));
    }

    if config.relay_timeout.is_some_and(|timeout| timeout.is_zero()) {
        return Err(SocksTunError::Config("Relay timeout must be greater than 0".to_string()));
    }

    Ok(())
}
