//! Client-side cache with per-entry expiry, lazy eviction on read and a
//! periodic housekeeping sweep.

pub mod housekeeper;
pub mod service;
pub mod storage;
pub mod store;

pub use housekeeper::{Housekeeper, HousekeeperHandle, SweepReport};
pub use service::CacheService;
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use store::{expiry_from_now, now_ms, shared, CacheEntry, CacheStore, Namespace, SharedStorage};
