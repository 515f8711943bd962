//! SOCKS5 client handshake
//!
//! Negotiates the authentication method with the proxy and, when the proxy
//! asks for it, performs the username/password sub-negotiation (RFC 1929).
//!
//! ```text
//! client                               server
//!   | 05 02 00 02                        |   greeting
//!   |<-------------------------- VER METHOD
//!   | 01 ULEN user PLEN pass             |   only if METHOD == 02
//!   |<-------------------------- VER STATUS
//! ```

use std::fmt;
use std::io;

use bytes::{BufMut, BytesMut};
use log::{debug, info};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

// SOCKS5 protocol constants
pub const SOCKS5_VERSION: u8 = 0x05;
pub const METHOD_NO_AUTH: u8 = 0x00;
pub const METHOD_USERNAME_PASSWORD: u8 = 0x02;
pub const AUTH_VERSION: u8 = 0x01;
pub const AUTH_SUCCESS: u8 = 0x00;

/// Greeting offering no-auth and username/password
pub const GREETING: [u8; 4] = [SOCKS5_VERSION, 0x02, METHOD_NO_AUTH, METHOD_USERNAME_PASSWORD];

/// Longest username or password the sub-negotiation can carry
pub const MAX_CREDENTIAL_LEN: usize = u8::MAX as usize;

/// Handshake step an error occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    SendGreeting,
    ReadMethod,
    SendAuth,
    ReadAuthResponse,
}

impl fmt::Display for HandshakePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SendGreeting => write!(f, "sending greeting"),
            Self::ReadMethod => write!(f, "reading method selection"),
            Self::SendAuth => write!(f, "sending credentials"),
            Self::ReadAuthResponse => write!(f, "reading authentication response"),
        }
    }
}

/// SOCKS5 handshake error
#[derive(Error, Debug)]
pub enum HandshakeError {
    /// I/O failure, tagged with the phase it happened in
    #[error("I/O error while {phase}: {source}")]
    Io {
        phase: HandshakePhase,
        #[source]
        source: io::Error,
    },

    /// The server rejected the credentials
    #[error("authentication failed (version {version:#04x}, status {status:#04x})")]
    AuthenticationFailed { version: u8, status: u8 },

    /// Strict policy only: the server picked something we did not offer
    #[error("server selected unsupported method {method:#04x} (version {version:#04x})")]
    UnsupportedMethod { version: u8, method: u8 },

    /// A credential does not fit its one-byte length field
    #[error("{field} is {len} bytes long, at most 255 are allowed")]
    CredentialTooLong { field: &'static str, len: usize },
}

impl HandshakeError {
    /// Phase of an I/O failure
    pub fn phase(&self) -> Option<HandshakePhase> {
        match self {
            Self::Io { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

/// How to treat a method selection other than username/password
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MethodPolicy {
    /// Accept whatever the server chose without checking the version byte
    #[default]
    Lenient,
    /// Require version 5 and one of the offered methods
    Strict,
}

/// Method the handshake finished with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// Authenticated with username/password
    UsernamePassword,
    /// Server chose no authentication
    NoAuth,
    /// Lenient policy accepted a method we did not offer
    Unverified(u8),
}

/// Handshake progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Greeting,
    MethodSelected(u8),
    Authenticating,
    Authenticated(AuthMethod),
    AuthFailed,
}

/// Username/password pair, each at most 255 bytes
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: Vec<u8>,
    password: Vec<u8>,
}

impl Credentials {
    /// Validate and build credentials
    pub fn new(
        username: impl Into<Vec<u8>>,
        password: impl Into<Vec<u8>>,
    ) -> Result<Self, HandshakeError> {
        let username = username.into();
        let password = password.into();

        check_len("username", &username)?;
        check_len("password", &password)?;

        Ok(Self { username, password })
    }

    pub fn username(&self) -> &[u8] {
        &self.username
    }

    pub fn password(&self) -> &[u8] {
        &self.password
    }

    /// Encode the sub-negotiation request `01 ULEN user PLEN pass`
    pub fn encode_auth_request(&self) -> BytesMut {
        let mut request = BytesMut::with_capacity(3 + self.username.len() + self.password.len());
        request.put_u8(AUTH_VERSION);
        // Lengths were checked in `new`
        request.put_u8(self.username.len() as u8);
        request.put_slice(&self.username);
        request.put_u8(self.password.len() as u8);
        request.put_slice(&self.password);
        request
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &String::from_utf8_lossy(&self.username))
            .field("password", &"<redacted>")
            .finish()
    }
}

fn check_len(field: &'static str, value: &[u8]) -> Result<(), HandshakeError> {
    if value.len() > MAX_CREDENTIAL_LEN {
        return Err(HandshakeError::CredentialTooLong {
            field,
            len: value.len(),
        });
    }
    Ok(())
}

/// SOCKS5 client handshake over an already connected stream
///
/// The stream is borrowed: on success it is ready for payload traffic, on
/// failure the caller decides what to do with it (normally drop it). Any
/// deadline must be armed on the stream before calling [`run`](Self::run).
pub struct Socks5Handshake<'a, S> {
    stream: S,
    credentials: &'a Credentials,
    policy: MethodPolicy,
    state: HandshakeState,
}

impl<'a, S> Socks5Handshake<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, credentials: &'a Credentials) -> Self {
        Self {
            stream,
            credentials,
            policy: MethodPolicy::default(),
            state: HandshakeState::Greeting,
        }
    }

    pub fn policy(mut self, policy: MethodPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Run the whole handshake
    pub async fn run(mut self) -> Result<AuthMethod, HandshakeError> {
        self.send_greeting().await?;
        let (version, method) = self.read_method().await?;

        if self.policy == MethodPolicy::Strict && version != SOCKS5_VERSION {
            return Err(HandshakeError::UnsupportedMethod { version, method });
        }
        if method != METHOD_USERNAME_PASSWORD {
            let auth = self.accept_without_auth(version, method)?;
            self.state = HandshakeState::Authenticated(auth);
            return Ok(auth);
        }

        self.state = HandshakeState::Authenticating;
        self.send_auth().await?;
        self.read_auth_response().await?;

        self.state = HandshakeState::Authenticated(AuthMethod::UsernamePassword);
        info!(
            "SOCKS5 authenticated as '{}'",
            String::from_utf8_lossy(self.credentials.username())
        );
        Ok(AuthMethod::UsernamePassword)
    }

    async fn send_greeting(&mut self) -> Result<(), HandshakeError> {
        debug!("SOCKS5 greeting: {:02x?}", GREETING);
        self.stream
            .write_all(&GREETING)
            .await
            .map_err(io_error(HandshakePhase::SendGreeting))?;
        self.stream
            .flush()
            .await
            .map_err(io_error(HandshakePhase::SendGreeting))
    }

    async fn read_method(&mut self) -> Result<(u8, u8), HandshakeError> {
        let mut response = [0u8; 2];
        self.stream
            .read_exact(&mut response)
            .await
            .map_err(io_error(HandshakePhase::ReadMethod))?;

        let [version, method] = response;
        debug!("SOCKS5 method selection: version {:#04x}, method {:#04x}", version, method);
        self.state = HandshakeState::MethodSelected(method);
        Ok((version, method))
    }

    fn accept_without_auth(&self, version: u8, method: u8) -> Result<AuthMethod, HandshakeError> {
        match self.policy {
            MethodPolicy::Strict if method != METHOD_NO_AUTH => {
                Err(HandshakeError::UnsupportedMethod { version, method })
            }
            MethodPolicy::Strict => Ok(AuthMethod::NoAuth),
            MethodPolicy::Lenient if method == METHOD_NO_AUTH => {
                info!("SOCKS5 server did not ask for authentication");
                Ok(AuthMethod::NoAuth)
            }
            MethodPolicy::Lenient => {
                info!(
                    "SOCKS5 server selected method {:#04x}, continuing without authentication",
                    method
                );
                Ok(AuthMethod::Unverified(method))
            }
        }
    }

    async fn send_auth(&mut self) -> Result<(), HandshakeError> {
        let request = self.credentials.encode_auth_request();
        debug!("SOCKS5 sending {} byte authentication request", request.len());
        self.stream
            .write_all(&request)
            .await
            .map_err(io_error(HandshakePhase::SendAuth))?;
        self.stream
            .flush()
            .await
            .map_err(io_error(HandshakePhase::SendAuth))
    }

    async fn read_auth_response(&mut self) -> Result<(), HandshakeError> {
        let mut response = [0u8; 2];
        self.stream
            .read_exact(&mut response)
            .await
            .map_err(io_error(HandshakePhase::ReadAuthResponse))?;

        let [version, status] = response;
        if version != AUTH_VERSION || status != AUTH_SUCCESS {
            self.state = HandshakeState::AuthFailed;
            return Err(HandshakeError::AuthenticationFailed { version, status });
        }
        Ok(())
    }
}

fn io_error(phase: HandshakePhase) -> impl FnOnce(io::Error) -> HandshakeError {
    move |source| HandshakeError::Io { phase, source }
}
