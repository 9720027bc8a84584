//! Durable store (L3) implementations.

pub mod memory;
pub mod mysql;

pub use memory::InMemoryRepository;
pub use mysql::MySqlRepository;
pub use stubby_core::repository::{
    NewUrlMapping, ReadRepository, Repository, Result, UrlMapping,
};
pub use stubby_core::StorageError;
