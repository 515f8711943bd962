//! Virtual interface provider
//!
//! The virtual network interface itself is created by an external bridge
//! process that owns the device; this crate only consumes a duplex stream
//! carrying its traffic. [`TcpBridgeInterface`] accepts that stream over
//! local TCP.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, info};
use tokio::net::{TcpListener, TcpStream};

use crate::common::{parse_cidr, Result, SocksTunError};
use crate::relay::DuplexStream;

/// Supplies the stream the virtual interface reads and writes through
pub trait InterfaceProvider: Send + Sync {
    type Stream: DuplexStream;

    /// Open the interface stream
    ///
    /// Failure here is fatal and happens before any relay begins.
    fn open(&self) -> BoxFuture<'_, Result<Self::Stream>>;
}

/// Interface bridged over a single local TCP connection
#[derive(Debug, Clone)]
pub struct TcpBridgeInterface {
    name: String,
    address: IpAddr,
    prefix: u8,
    listen: SocketAddr,
}

impl TcpBridgeInterface {
    /// Describe the interface `name` configured with `cidr`, bridged on `listen`
    pub fn new(name: impl Into<String>, cidr: &str, listen: SocketAddr) -> Result<Self> {
        let (address, prefix) = parse_cidr(cidr)
            .map_err(|e| SocksTunError::InterfaceSetup(format!("Invalid interface address: {}", e)))?;

        Ok(Self {
            name: name.into(),
            address,
            prefix,
            listen,
        })
    }

    pub fn address(&self) -> (IpAddr, u8) {
        (self.address, self.prefix)
    }

    /// Bind the bridge listener without waiting for the bridge yet
    pub async fn bind(&self) -> Result<BridgeListener> {
        let listener = TcpListener::bind(self.listen).await.map_err(|e| {
            SocksTunError::InterfaceSetup(format!("Failed to bind {}: {}", self.listen, e))
        })?;
        let local_addr = listener.local_addr()?;

        info!("Waiting for interface bridge for {} on {}", self, local_addr);
        Ok(BridgeListener {
            listener,
            local_addr,
            name: self.name.clone(),
        })
    }
}

impl fmt::Display for TcpBridgeInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}/{})", self.name, self.address, self.prefix)
    }
}

impl InterfaceProvider for TcpBridgeInterface {
    type Stream = TcpStream;

    fn open(&self) -> BoxFuture<'_, Result<TcpStream>> {
        async move { self.bind().await?.accept().await }.boxed()
    }
}

/// Bound bridge listener, accepts exactly one connection
#[derive(Debug)]
pub struct BridgeListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    name: String,
}

impl BridgeListener {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept the bridge connection and stop listening
    pub async fn accept(self) -> Result<TcpStream> {
        let (stream, peer) = self.listener.accept().await.map_err(|e| {
            SocksTunError::InterfaceSetup(format!("Failed to accept interface bridge: {}", e))
        })?;
        stream.set_nodelay(true)?;

        info!("Interface {} attached from {}", self.name, peer);
        debug!("Bridge listener on {} closed", self.local_addr);
        Ok(stream)
    }
}
