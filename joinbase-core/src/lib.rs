// joinbase-core/src/lib.rs
//! JoinBase core
//!
//! Streams large JSON entity collections into a document store in fixed-size
//! batches, and answers field-equality searches augmented with declared
//! cross-collection joins, compiled into a `$match` + `$lookup` pipeline.
//!
//! ```rust
//! use joinbase_core::{open_repository, SearchClause, StoreConfig};
//! use joinbase_core::CollectionName;
//!
//! let mut repo = open_repository(&StoreConfig::default())?;
//! repo.start("zendesk")?;
//! repo.leftjoin_names(
//!     CollectionName::new("user"), "organization_id",
//!     CollectionName::new("organization"), "_id",
//! );
//! let cursor = repo.search_in(&CollectionName::new("user"), &SearchClause::new().with("role", "admin"))?;
//! for doc in cursor {
//!     println!("{}", doc?);
//! }
//! repo.stop();
//! # Ok::<(), joinbase_core::JoinBaseError>(())
//! ```

pub mod aggregation;
pub mod config;
pub mod document;
pub mod error;
pub mod join_registry;
pub mod loader;
pub mod logging;
pub mod query;
pub mod repository;
pub mod storage;
pub mod value_utils;

// Public exports
pub use aggregation::{LookupStage, MatchStage, Pipeline, Stage};
pub use config::StoreConfig;
pub use document::{CollectionName, DocumentId, DynamicRecord, Record};
pub use error::{JoinBaseError, Result};
pub use join_registry::{JoinDefinition, JoinRegistry};
pub use loader::{BatchLoader, LoadSummary};
pub use logging::{LogLevel, LogSink, Logger, MemorySink, StderrSink};
pub use query::{QueryCompiler, SearchClause};
pub use repository::{open_gateway, open_repository, SearchRepository};
pub use storage::{DocumentCursor, InsertManyResult, MemoryCursor, MemoryStore, StoreGateway};
