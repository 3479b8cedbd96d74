//! # Bus-RPC Test Suite
//!
//! End-to-end tests: several connections on one in-memory bus, talking
//! through the full encode, publish, dispatch, correlate path.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs        # Shared bus, node builders, sample commands
//! └── integration/
//!     ├── call_flows.rs        # Status mapping and collection limits
//!     ├── streaming.rs         # Multi-reply handlers and stream consumption
//!     ├── self_suppression.rs  # Combined caller + server on one channel
//!     ├── failure_modes.rs     # Transport, frame and misuse errors
//!     └── codecs.rs            # Alternative payload encodings
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p rpc-tests
//! cargo test -p rpc-tests integration::streaming::
//! ```

#![allow(dead_code)]

pub mod integration;
