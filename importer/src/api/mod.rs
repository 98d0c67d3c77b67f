//! Remote API module.
//!
//! HTTP client for the Kordiam element endpoints, its wire types, and the
//! run-event broadcaster.

pub mod client;
pub mod logs;
pub mod types;

pub use client::{KordiamClient, Submitter};
pub use logs::*;
pub use types::*;
