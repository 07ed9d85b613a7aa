//! # gyschat
//!
//! Client core for the GYS Chat assistant.
//!
//! - [`cache`]: namespaced key-value cache with per-entry expiry, lazy
//!   eviction on read and a periodic housekeeping sweep.
//! - [`client`]: backend HTTP client, cache-aside resolvers for document
//!   chunks, image sources and suggestions, and the chat stream decoder.
//! - [`auth`]: access-token sign-in.
//! - [`references`]: `[doc-…]`, `[docsum-…]` and `[link-…]` markers in
//!   assistant messages.
//! - [`config`]: JSON config with environment overrides.

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod references;

pub use error::{GysError, Result};
