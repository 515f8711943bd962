//! Relay module
//!
//! Bidirectional byte relay between the virtual interface stream and the
//! authenticated proxy circuit, with half-close propagation and a bounded
//! wait for the peer after one direction finishes.

pub mod stream;
mod forwarder;

pub use forwarder::{
    Direction, DirectionReport, Relay, RelayOutcome, Termination, HALF_CLOSE_TIMEOUT,
};
pub use stream::{split, DeadlineStream, DuplexStream, HalfClose, ReadEnd, WriteEnd};
