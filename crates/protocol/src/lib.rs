#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Wire records exchanged between the delta sender and receiver.
//!
//! Two record kinds cross the transport: [`BlockHash`] signature entries
//! flowing from the receiver to the sender, and [`Operation`] delta
//! instructions flowing back. Both carry their own fixed little-endian
//! encodings; the transport that frames them is out of scope here.
//!
//! Deserializers report [`WireError::ShortBuffer`] when handed a truncated
//! record so a streaming caller can refill its buffer and retry; every other
//! error is fatal for the stream.

mod block_hash;
mod error;
mod op;

pub use block_hash::{BlockHash, BLOCK_HASH_SIZE};
pub use error::WireError;
pub use op::Operation;

/// Block size used when the caller does not choose one.
pub const DEFAULT_BLOCK_SIZE: usize = 6 * 1024;
