//! Wire format of the peer channel.
//!
//! Frames are JSON bodies of the form `{messageName, context, payload}`,
//! wrapped in a `<WBChannel>` delimiter pair on the way out. [`Envelope`]
//! owns the codec; [`MessageKind`] names the catalog; the [`messages`]
//! module holds typed context and payload shapes.

mod envelope;
mod error;
mod kind;
pub mod messages;

pub use envelope::{ENVELOPE_END, ENVELOPE_START, Envelope};
pub use error::ProtoError;
pub use kind::MessageKind;
