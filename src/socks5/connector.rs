//! Proxy connection setup
//!
//! Dials the proxy, arms the handshake deadline, authenticates and hands the
//! stream back with the deadline cleared.

use std::io;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, error, info};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::common::{Result, SocksTunError};
use crate::relay::{DeadlineStream, DuplexStream};
use super::handshake::{AuthMethod, Credentials, HandshakeError, MethodPolicy, Socks5Handshake};

/// Default deadline for the whole handshake
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens raw streams to the proxy
#[cfg_attr(test, mockall::automock(type Stream = tokio::io::DuplexStream;))]
pub trait ProxyDialer: Send + Sync {
    type Stream: DuplexStream;

    /// Connect to `address` (`host:port`)
    fn dial(&self, address: &str) -> BoxFuture<'static, io::Result<Self::Stream>>;
}

/// Plain TCP dialer
#[derive(Debug, Clone, Default)]
pub struct TcpDialer {
    nodelay: bool,
}

impl TcpDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable Nagle's algorithm on dialed sockets
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

impl ProxyDialer for TcpDialer {
    type Stream = TcpStream;

    fn dial(&self, address: &str) -> BoxFuture<'static, io::Result<TcpStream>> {
        let address = address.to_owned();
        let nodelay = self.nodelay;
        async move {
            let stream = TcpStream::connect(&address).await?;
            stream.set_nodelay(nodelay)?;
            Ok(stream)
        }
        .boxed()
    }
}

/// Dials and authenticates a proxy circuit
///
/// # Example
///
/// ```no_run
/// # use socks_tun::socks5::{Credentials, Socks5Connector, TcpDialer};
/// # async fn example() -> socks_tun::Result<()> {
/// let credentials = Credentials::new("user", "secret")?;
/// let connector = Socks5Connector::new(TcpDialer::new(), "127.0.0.1:1080", credentials);
/// let circuit = connector.connect().await?;
/// # Ok(())
/// # }
/// ```
pub struct Socks5Connector<D> {
    dialer: D,
    proxy: String,
    credentials: Credentials,
    handshake_timeout: Duration,
    policy: MethodPolicy,
}

impl<D: ProxyDialer> Socks5Connector<D> {
    pub fn new(dialer: D, proxy: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            dialer,
            proxy: proxy.into(),
            credentials,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            policy: MethodPolicy::default(),
        }
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn policy(mut self, policy: MethodPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Dial the proxy and run the handshake under the handshake deadline
    ///
    /// On failure the stream is dropped, which closes it.
    pub async fn connect(&self) -> Result<D::Stream> {
        debug!("Dialing SOCKS5 proxy {}", self.proxy);
        let stream = self
            .dialer
            .dial(&self.proxy)
            .await
            .map_err(|source| SocksTunError::Dial {
                address: self.proxy.clone(),
                source,
            })?;

        let mut stream = DeadlineStream::new(stream);
        stream.set_deadline(Instant::now() + self.handshake_timeout);

        let result = Socks5Handshake::new(&mut stream, &self.credentials)
            .policy(self.policy)
            .run()
            .await;

        match result {
            Ok(method) => {
                metrics::counter!("socks_tun_handshakes_total", "result" => "success").increment(1);
                info!("SOCKS5 circuit to {} ready ({})", self.proxy, describe(method));
                Ok(stream.into_inner())
            }
            Err(e) => {
                metrics::counter!("socks_tun_handshakes_total", "result" => "failure").increment(1);
                if matches!(&e, HandshakeError::Io { source, .. } if source.kind() == io::ErrorKind::TimedOut) {
                    error!(
                        "SOCKS5 handshake with {} did not finish within {:?}",
                        self.proxy, self.handshake_timeout
                    );
                } else {
                    error!("SOCKS5 handshake with {} failed: {}", self.proxy, e);
                }
                Err(SocksTunError::Handshake(e))
            }
        }
    }
}

fn describe(method: AuthMethod) -> String {
    match method {
        AuthMethod::UsernamePassword => "username/password".to_string(),
        AuthMethod::NoAuth => "no authentication".to_string(),
        AuthMethod::Unverified(m) => format!("unverified method {:#04x}", m),
    }
}
