//! # Bosswave Router Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs       # in-memory router, entities, DOT grants
//!     ├── publish_flow.rs   # two-hop delegation, over-constrained chains
//!     ├── revocation.rs     # revocation cascade through registry events
//!     ├── chain_build.rs    # chain discovery from registry DOTs
//!     ├── aliases.rs        # long and short alias round trips
//!     └── oob_wire.rs       # real TCP sessions against the OOB listener
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p bw-tests
//! cargo test -p bw-tests integration::oob_wire
//! cargo bench -p bw-tests
//! ```

pub mod integration;
