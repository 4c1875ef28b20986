#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Delta generation and application.
//!
//! This crate implements both ends of the rsync delta transfer
//! (<https://rsync.samba.org/tech_report/tech_report.html>):
//! - [`Differ`] slides a rolling-checksum window over the source, matches
//!   target blocks out of a signature, and emits a lazy stream of
//!   [`Operation`](protocol::Operation)s.
//! - [`Patcher`] replays that stream against the seekable target, writing
//!   the reconstructed source and verifying the trailing stream checksum.
//!
//! Both sides must agree on the block size and on the hash algorithms; the
//! defaults are XXH3-64 for blocks and XXH3-128 for the stream.
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//!
//! use delta::{Differ, Patcher};
//! use signature::make_signature;
//!
//! let target = b"the quick brown fox jumps over the lazy dog".to_vec();
//! let source = b"the quick brown cat jumps over the lazy dog".to_vec();
//!
//! // Receiver side: hash the target in blocks.
//! let blocks: std::io::Result<Vec<_>> =
//!     make_signature(Cursor::new(target.clone()), 8).collect();
//!
//! // Sender side: diff the source against the signature.
//! let mut differ: Differ<_> = Differ::new(Cursor::new(source.clone()), blocks?, 8);
//!
//! // Receiver side again: rebuild the source from target blocks + literals.
//! let mut output = Vec::new();
//! let mut patcher: Patcher<_, _> = Patcher::new(Cursor::new(target), &mut output, 8);
//! while let Some(op) = differ.next_op()? {
//!     patcher.apply(&op)?;
//! }
//! drop(patcher);
//! assert_eq!(output, source);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod apply;
mod diff;
mod index;

pub use apply::{apply_delta, ApplyError, Patcher};
pub use diff::{generate_delta, DeltaStats, Differ};
