//! SOCKS5 client module
//!
//! Username/password authentication against an upstream SOCKS5 proxy
//! (RFC 1928 method negotiation, RFC 1929 sub-negotiation). No CONNECT
//! request is sent: once authenticated, the circuit carries raw bytes.

mod connector;
mod handshake;

pub use connector::{ProxyDialer, Socks5Connector, TcpDialer, HANDSHAKE_TIMEOUT};
pub use handshake::{
    AuthMethod, Credentials, HandshakeError, HandshakePhase, HandshakeState, MethodPolicy,
    Socks5Handshake, AUTH_SUCCESS, AUTH_VERSION, GREETING, MAX_CREDENTIAL_LEN, METHOD_NO_AUTH,
    METHOD_USERNAME_PASSWORD, SOCKS5_VERSION,
};
