//! Protocol session: one simulated editor client on the peer channel.

mod heartbeat;
mod requests;
mod session;
#[cfg(test)]
pub(crate) mod testing;

pub use session::{ProtocolSession, SessionOptions, SessionResources};
