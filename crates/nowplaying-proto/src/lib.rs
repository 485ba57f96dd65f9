//! ICY "now playing" lookups for internet radio streams.
//!
//! [`fetch::IcyFetcher`] does the protocol work; everything else here is the
//! configuration, the station allow-list and the polling glue around it.

pub mod config;
pub mod error;
pub mod fetch;
pub mod icy;
pub mod platform;
pub mod poll;
pub mod protocol;
pub mod stations;

pub use error::{FailureKind, FetchError};
pub use fetch::IcyFetcher;
