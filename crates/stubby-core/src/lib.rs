//! Core types and traits for the Stubby URL shortener.
//!
//! This crate provides the types shared by the code generators, the cache
//! tiers, the durable store and the resolution service.

pub mod cache;
pub mod error;
pub mod repository;
pub mod shortcode;

pub use cache::{CacheStats, UrlCache, UrlRecord};
pub use error::{CacheError, CoreError, StorageError};
pub use repository::{NewUrlMapping, ReadRepository, Repository, UrlMapping};
pub use shortcode::ShortCode;
