//! Common module
//!
//! This module contains shared errors, logging, networking helpers and the
//! relay buffer pool used throughout the application.

pub mod error;
pub mod log;
pub mod net;
pub mod buffer_pool;

// Re-export commonly used types and functions
pub use error::{SocksTunError, Result};
pub use log::init_logger;
pub use net::{parse_socket_addr, split_host_port, parse_cidr};
pub use buffer_pool::{BufferPool, PooledBuffer, RELAY_BUFFER_SIZE};
