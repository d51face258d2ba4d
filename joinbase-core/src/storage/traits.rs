// src/storage/traits.rs
//! Store gateway abstraction
//!
//! The loader and the query path only need a started session, bulk insert
//! and pipeline execution returning a lazy cursor from a document store.
//!
//! ```text
//! StoreGateway trait
//!   ├── MemoryStore (embedded, built in)
//!   └── test doubles (recording inserts, injecting failures)
//! ```

use serde_json::Value;

use crate::aggregation::Pipeline;
use crate::document::{CollectionName, DocumentId};
use crate::error::Result;

/// Result of an `insert_many` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertManyResult {
    pub inserted_ids: Vec<DocumentId>,
    pub inserted_count: usize,
}

pub trait StoreGateway: Send + Sync {
    type Cursor: DocumentCursor;

    /// Open the store session. Must be called once before any insert or query.
    fn start(&mut self, store_name: &str) -> Result<()>;

    /// Close the store session.
    ///
    /// Idempotent, and safe to call when `start` never succeeded.
    fn stop(&mut self);

    fn is_started(&self) -> bool;

    /// Insert a batch of documents into `collection`, creating the collection
    /// on first use.
    ///
    /// A batch is all-or-nothing: on `WriteFailure` none of its documents are
    /// stored. Earlier batches are unaffected.
    fn insert_many(&self, collection: &CollectionName, documents: Vec<Value>)
        -> Result<InsertManyResult>;

    /// Run `pipeline` against `collection`.
    ///
    /// The pipeline is validated before anything is returned; a rejected
    /// pipeline is a `QueryFailure` with no partial results.
    fn aggregate(&self, collection: &CollectionName, pipeline: &Pipeline) -> Result<Self::Cursor>;
}

/// Lazy, forward-only, finite sequence of result documents.
///
/// Iteration may block while the next page is fetched. A cursor cannot be
/// rewound; run the query again to start over. Dropping the cursor, or
/// reaching its end, releases the store resources it holds.
pub trait DocumentCursor: Iterator<Item = Result<Value>> {
    /// True once every document has been yielded or the cursor was closed
    fn is_exhausted(&self) -> bool;

    /// Fetch up to `max` documents
    fn next_batch(&mut self, max: usize) -> Result<Vec<Value>> {
        let mut batch = Vec::with_capacity(max);
        while batch.len() < max {
            match self.next() {
                Some(doc) => batch.push(doc?),
                None => break,
            }
        }
        Ok(batch)
    }

    /// Release the cursor before reaching its end
    fn close(self)
    where
        Self: Sized,
    {
        drop(self);
    }
}
