#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Checksum primitives for the delta engine.
//!
//! The crate exposes the rolling weak checksum used to screen candidate block
//! matches together with the strong XXH3 digests that confirm them. The weak
//! checksum is fixed; the strong hashes are pluggable through the
//! [`StrongHash`] and [`Checksummer`] traits so both transfer peers can agree
//! on an algorithm without the engine hard-coding one.

mod rolling;
pub mod strong;

pub use rolling::RollingChecksum;
pub use strong::{Checksummer, StrongHash, Xxh3, Xxh3_128};
