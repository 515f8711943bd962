//! socks-tun: bridge a virtual network interface to an authenticated SOCKS5 circuit
//!
//! The crate connects to an upstream SOCKS5 proxy, authenticates with
//! username/password and then relays raw bytes between the virtual interface
//! stream and the proxy circuit until both directions have finished.
//!
//! # Main Features
//!
//! - SOCKS5 greeting and RFC 1929 username/password sub-negotiation under a deadline
//! - Bidirectional relay with half-close propagation
//! - Bounded wait for the peer once one direction has finished
//! - Pooled relay buffers
//!
//! # Example
//!
//! ```no_run
//! use socks_tun::{Relay, Result, Socks5Connector};
//! use socks_tun::common::{parse_socket_addr, BufferPool};
//! use socks_tun::interface::{InterfaceProvider, TcpBridgeInterface};
//! use socks_tun::socks5::{Credentials, TcpDialer};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let credentials = Credentials::new("user", "secret")?;
//!     let circuit = Socks5Connector::new(TcpDialer::new(), "127.0.0.1:1080", credentials)
//!         .connect()
//!         .await?;
//!
//!     let interface = TcpBridgeInterface::new("tun0", "192.168.124.1/24", parse_socket_addr("127.0.0.1:7070")?)?;
//!     let origin = interface.open().await?;
//!
//!     let outcome = Relay::new(BufferPool::new(20 * 1024)).run(origin, circuit).await;
//!     println!("clean shutdown: {}", outcome.is_clean());
//!     Ok(())
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod interface;
pub mod relay;
pub mod socks5;

// Re-export commonly used structures and functions for convenience
pub use common::{Result, SocksTunError};
pub use config::TunnelConfig;
pub use relay::{Relay, RelayOutcome};
pub use socks5::Socks5Connector;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
