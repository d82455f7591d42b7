//! An out-of-the-box tool relay that wires a model provider, stdio tool
//! back-ends and their configuration into an agent.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library to answer chat messages from your own host apps.

#![deny(missing_docs)]

#[allow(unused_imports)]
#[macro_use]
extern crate tracing;

mod session;

pub use session::{Session, SessionBuilder};

/// Re-exports of [`toolrelay_core`] crate.
pub mod core {
    pub use toolrelay_core::*;
}
