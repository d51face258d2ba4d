// src/storage/mod.rs
// Store gateway contract and the embedded in-memory engine

pub mod memory_storage;
pub mod traits;

pub use memory_storage::{MemoryCursor, MemoryStore};
pub use traits::{DocumentCursor, InsertManyResult, StoreGateway};
