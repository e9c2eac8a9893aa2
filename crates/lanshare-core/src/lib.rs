//! Lanshare core.
//!
//! I/O-free heart of the LAN relay: the shared message store, the
//! capability gate in front of it, and the JSON wire types.
//!
//! # Components
//!
//! - [`Store`]: insertion-ordered messages behind one exclusive lock
//! - [`Capabilities`]: the manage and remote-access secrets, and request
//!   classification into an [`AccessLevel`]
//! - [`ApiResponse`]: `{"ret":..,"data":..}` responses as a typed union
//! - [`Environment`]: clock and entropy, swapped for deterministic tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod env;
pub mod gate;
pub mod message;
pub mod store;
pub mod wire;

pub use env::Environment;
pub use gate::{AccessLevel, Capabilities};
pub use message::{FileContent, Message, MessageKind, MessageView, Payload, SCRUB_BYTE};
pub use store::{Store, StoreError};
pub use wire::{AccessInfo, ApiResponse, ResponseData, RetCode};
