//! Development ledgers
//!
//! A minimal rendition of the capsule contract's observable behavior so the
//! engine and CLI run without a network. Not a contract implementation: no
//! gas, no signatures, no coins.

mod local;
mod memory;
mod state;

pub use local::LocalLedger;
pub use memory::InMemoryLedger;
pub use state::DEV_PACKAGE;
