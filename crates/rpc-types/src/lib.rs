//! # RPC Types Crate
//!
//! The vocabulary every node on a broadcast channel agrees on.
//!
//! ## Design Principles
//!
//! - **Opaque identities**: `Address` and `NodeId` are correlation keys only,
//!   never interpreted.
//! - **Short wire names**: payload fields serialize as `c`, `n`, `a`, `d`
//!   (requests) and `s`, `n`, `a`, `d` (responses).
//! - **Closed status vocabulary**: every dispatch outcome maps to one
//!   `StatusCode`.

pub mod ids;
pub mod message;
pub mod status;

pub use ids::{Address, CommandIndex, NodeId};
pub use message::{Arguments, Request, Response};
pub use status::{MessageKind, StatusCode, UnknownStatus};
