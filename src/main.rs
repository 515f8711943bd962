//! socks-tun command line tool
//!
//! Connects to the proxy, waits for the interface bridge and relays until
//! both directions end or Ctrl+C is pressed.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};

use socks_tun::common::{init_logger, parse_socket_addr, BufferPool, Result};
use socks_tun::config::{ConfigOverrides, ConfigValidator, TunnelConfig, CONFIG_FILE_ENV};
use socks_tun::interface::{InterfaceProvider, TcpBridgeInterface};
use socks_tun::relay::Relay;
use socks_tun::socks5::{Socks5Connector, TcpDialer};
use socks_tun::{APP_NAME, VERSION};

/// Bridge a virtual network interface to an authenticated SOCKS5 proxy
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Load configuration from a JSON file
    #[clap(long, env = CONFIG_FILE_ENV)]
    config_file: Option<PathBuf>,

    /// SOCKS5 proxy address (host:port)
    #[clap(long)]
    proxy: Option<String>,

    /// Proxy username
    #[clap(long)]
    user: Option<String>,

    /// Proxy password
    #[clap(long)]
    password: Option<String>,

    /// Name of the virtual interface
    #[clap(long)]
    interface_name: Option<String>,

    /// Interface address in CIDR notation
    #[clap(long)]
    interface_address: Option<String>,

    /// Address the interface bridge connects to
    #[clap(long)]
    interface_listen: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[clap(long)]
    log_level: Option<String>,

    /// Require SOCKS version 5 and one of the offered methods (no auth or username/password)
    #[clap(long)]
    strict_method_check: bool,
}

impl TryFrom<Args> for ConfigOverrides {
    type Error = socks_tun::SocksTunError;

    fn try_from(args: Args) -> Result<Self> {
        Ok(Self {
            proxy: args.proxy,
            username: args.user,
            password: args.password,
            interface_name: args.interface_name,
            interface_address: args.interface_address,
            interface_listen: args
                .interface_listen
                .as_deref()
                .map(parse_socket_addr)
                .transpose()?,
            log_level: args.log_level,
            strict_method_check: args.strict_method_check.then_some(true),
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config_file = args.config_file.clone();
    let loaded = TunnelConfig::load(config_file.as_deref())
        .and_then(|config| Ok(config.merge(ConfigOverrides::try_from(args)?)));
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            // Logging is not configured yet
            init_logger("info");
            return Err(e);
        }
    };

    init_logger(&config.log_level);
    info!("Starting {} v{}", APP_NAME, VERSION);

    config.validate()?;
    config.log();

    // Proxy first, then the interface
    let connector = Socks5Connector::new(TcpDialer::new().nodelay(true), config.proxy.as_str(), config.credentials()?)
        .handshake_timeout(config.handshake_timeout)
        .policy(config.method_policy());
    let circuit = connector.connect().await?;

    let interface = TcpBridgeInterface::new(
        config.interface_name.as_str(),
        &config.interface_address,
        config.interface_listen,
    )?;
    let origin = interface.open().await?;

    let relay = Relay::new(BufferPool::new(config.buffer_size))
        .half_close_timeout(config.half_close_timeout)
        .relay_timeout(config.relay_timeout);

    info!("Relaying between {} and {}", interface, config.proxy);
    tokio::select! {
        outcome = relay.run(origin, circuit) => {
            for report in outcome.reports() {
                info!(
                    "{}: {} bytes, {}",
                    report.direction, report.bytes, report.termination
                );
            }
            if !outcome.is_clean() {
                warn!("Relay finished with errors");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use socks_tun::socks5::MethodPolicy;

    #[test]
    fn test_strict_method_check_flag() {
        let args = Args::try_parse_from(["socks-tun", "--strict-method-check", "--interface-listen", "127.0.0.1:9000"])
            .unwrap();
        let config = TunnelConfig::default().merge(ConfigOverrides::try_from(args).unwrap());

        assert_eq!(config.method_policy(), MethodPolicy::Strict);
        assert_eq!(config.interface_listen, "127.0.0.1:9000".parse::<std::net::SocketAddr>().unwrap());
    }

    #[test]
    fn test_strict_method_check_help() {
        let help = Args::command().render_long_help().to_string();
        assert!(help.contains("one of the offered methods"));
    }
}
