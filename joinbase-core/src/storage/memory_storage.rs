// storage/memory_storage.rs
//! Embedded in-memory document store
//!
//! Implements `StoreGateway` with append-only collections held in memory.
//! All collections of one started store share a single session behind an
//! `Arc<RwLock<..>>`; cursors keep a clone of the `Arc` and take the read lock
//! only while fetching a page.
//!
//! ```text
//! MemoryStore
//!   └── Session (name, id)
//!         └── CollectionName -> CollectionData { documents, ids, last_id }
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use crate::aggregation::Pipeline;
use crate::config::{StoreConfig, DEFAULT_PAGE_SIZE};
use crate::document::{CollectionName, DocumentId};
use crate::error::{JoinBaseError, Result};
use crate::logging::Logger;
use crate::storage::{DocumentCursor, InsertManyResult, StoreGateway};
use crate::{log_debug, log_info, log_trace};

/// Per-collection state
#[derive(Debug, Default)]
struct CollectionData {
    /// Documents in insertion order; positions never change
    documents: Vec<Value>,
    ids: HashSet<DocumentId>,
    /// Highest integer `_id` seen, source of auto-increment ids
    last_id: u64,
}

#[derive(Debug)]
struct Session {
    name: String,
    id: Uuid,
    collections: HashMap<CollectionName, CollectionData>,
    /// Set by `stop`; cursors still holding the session stop reading
    closed: bool,
}

impl Session {
    fn documents(&self, collection: &CollectionName) -> &[Value] {
        self.collections
            .get(collection)
            .map(|data| data.documents.as_slice())
            .unwrap_or(&[])
    }
}

/// A validated batch, ready to append
struct StagedBatch {
    documents: Vec<Value>,
    ids: Vec<DocumentId>,
    last_id: u64,
}

/// Stage a batch against the current collection state without mutating it.
///
/// Assigns auto-increment `_id`s to documents without one (or with a null
/// `_id`) and rejects the whole batch on the first invalid document.
fn stage_batch(
    collection: &CollectionName,
    existing: Option<&CollectionData>,
    documents: Vec<Value>,
) -> Result<StagedBatch> {
    let mut last_id = existing.map_or(0, |data| data.last_id);
    let mut batch_ids = HashSet::with_capacity(documents.len());
    let mut staged = StagedBatch {
        documents: Vec::with_capacity(documents.len()),
        ids: Vec::with_capacity(documents.len()),
        last_id,
    };

    for (position, document) in documents.into_iter().enumerate() {
        let Value::Object(mut map) = document else {
            return Err(JoinBaseError::WriteFailure(format!(
                "Document {} of batch for '{}' is not an object",
                position, collection
            )));
        };

        let id = match map.get("_id") {
            None | Some(Value::Null) => {
                let id = DocumentId::new_auto(last_id);
                last_id += 1;
                map.insert("_id".to_string(), id.to_value());
                id
            }
            Some(value) => {
                let id = DocumentId::from_value(value).ok_or_else(|| {
                    JoinBaseError::WriteFailure(format!(
                        "Invalid _id {} in batch for '{}'",
                        value, collection
                    ))
                })?;
                if let DocumentId::Int(i) = id {
                    if i > last_id as i64 {
                        last_id = i as u64;
                    }
                }
                id
            }
        };

        let duplicate = existing.is_some_and(|data| data.ids.contains(&id));
        if duplicate || !batch_ids.insert(id.clone()) {
            return Err(JoinBaseError::WriteFailure(format!(
                "Duplicate _id {} in collection '{}'",
                id, collection
            )));
        }

        staged.documents.push(Value::Object(map));
        staged.ids.push(id);
    }

    staged.last_id = last_id;
    Ok(staged)
}

/// Embedded in-memory store
pub struct MemoryStore {
    session: Option<Arc<RwLock<Session>>>,
    page_size: usize,
    logger: Logger,
}

impl MemoryStore {
    pub fn new(logger: Logger) -> Self {
        MemoryStore {
            session: None,
            page_size: DEFAULT_PAGE_SIZE,
            logger,
        }
    }

    /// Store using the configured cursor page size.
    ///
    /// Only the settings this engine reads are checked; `open_gateway`
    /// validates the whole configuration.
    pub fn with_config(config: &StoreConfig, logger: Logger) -> Result<Self> {
        if config.page_size == 0 {
            return Err(JoinBaseError::ConfigurationError(
                "Page size must be at least 1".to_string(),
            ));
        }
        Ok(MemoryStore {
            session: None,
            page_size: config.page_size,
            logger,
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Name of the started store
    pub fn store_name(&self) -> Option<String> {
        self.session.as_ref().map(|s| s.read().name.clone())
    }

    /// Collections that received at least one document, sorted by name
    pub fn list_collections(&self) -> Vec<CollectionName> {
        let Some(session) = &self.session else {
            return Vec::new();
        };
        let mut names: Vec<CollectionName> = session.read().collections.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of documents in `collection` (0 if it does not exist)
    pub fn count(&self, collection: &CollectionName) -> usize {
        self.session
            .as_ref()
            .map_or(0, |s| s.read().documents(collection).len())
    }

    fn session(&self) -> Result<&Arc<RwLock<Session>>> {
        self.session.as_ref().ok_or(JoinBaseError::StoreNotStarted)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Logger::default())
    }
}

impl StoreGateway for MemoryStore {
    type Cursor = MemoryCursor;

    fn start(&mut self, store_name: &str) -> Result<()> {
        if let Some(name) = self.store_name() {
            return Err(JoinBaseError::ConfigurationError(format!(
                "Store '{}' is already started",
                name
            )));
        }
        if store_name.trim().is_empty() {
            return Err(JoinBaseError::ConfigurationError(
                "Store name cannot be empty".to_string(),
            ));
        }

        let session = Session {
            name: store_name.to_string(),
            id: Uuid::new_v4(),
            collections: HashMap::new(),
            closed: false,
        };
        log_info!(
            self.logger,
            "Store '{}' started (session {})",
            session.name,
            session.id
        );
        self.session = Some(Arc::new(RwLock::new(session)));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            let mut session = session.write();
            session.closed = true;
            log_info!(
                self.logger,
                "Store '{}' stopped (session {})",
                session.name,
                session.id
            );
        }
    }

    fn is_started(&self) -> bool {
        self.session.is_some()
    }

    fn insert_many(
        &self,
        collection: &CollectionName,
        documents: Vec<Value>,
    ) -> Result<InsertManyResult> {
        if !collection.is_valid() {
            return Err(JoinBaseError::WriteFailure(format!(
                "Invalid collection name: '{}'",
                collection
            )));
        }
        let mut state = self.session()?.write();

        let staged = stage_batch(collection, state.collections.get(collection), documents)?;
        let data = state.collections.entry(collection.clone()).or_default();
        data.documents.extend(staged.documents);
        data.ids.extend(staged.ids.iter().cloned());
        data.last_id = staged.last_id;

        log_trace!(
            self.logger,
            "Inserted {} documents into '{}' ({} total)",
            staged.ids.len(),
            collection,
            data.documents.len()
        );

        Ok(InsertManyResult {
            inserted_count: staged.ids.len(),
            inserted_ids: staged.ids,
        })
    }

    fn aggregate(&self, collection: &CollectionName, pipeline: &Pipeline) -> Result<MemoryCursor> {
        if !collection.is_valid() {
            return Err(JoinBaseError::QueryFailure(format!(
                "Invalid collection name: '{}'",
                collection
            )));
        }
        // Execute exactly what the MongoDB form of the pipeline says
        let pipeline = Pipeline::from_json(&pipeline.to_json())?;
        let session = self.session()?;

        log_debug!(
            self.logger,
            "Aggregating '{}' with {} lookup stage(s)",
            collection,
            pipeline.lookups().len()
        );

        Ok(MemoryCursor {
            session: Some(Arc::clone(session)),
            collection: collection.clone(),
            pipeline,
            position: 0,
            page_size: self.page_size,
            buffer: VecDeque::new(),
            logger: self.logger.clone(),
        })
    }
}

/// Streaming cursor over pipeline results
///
/// Documents appended to the collection while the cursor is open are
/// visible if the cursor has not yet passed their position. After the store
/// is stopped, documents already buffered are still yielded, then one
/// `StoreNotStarted` error ends the iteration.
pub struct MemoryCursor {
    /// Released at end of iteration or on close
    session: Option<Arc<RwLock<Session>>>,
    collection: CollectionName,
    pipeline: Pipeline,
    position: usize,
    page_size: usize,
    buffer: VecDeque<Value>,
    logger: Logger,
}

impl MemoryCursor {
    /// Scan forward until a page of results is buffered or the collection ends.
    ///
    /// Fails with `StoreNotStarted` if the store was stopped after the cursor
    /// was opened; the cursor is released either way.
    fn fetch_page(&mut self) -> Result<()> {
        let Some(session) = self.session.clone() else {
            return Ok(());
        };
        let state = session.read();
        if state.closed {
            self.session = None;
            return Err(JoinBaseError::StoreNotStarted);
        }
        let documents = state.documents(&self.collection);

        let start = self.position;
        while self.buffer.len() < self.page_size && self.position < documents.len() {
            let document = &documents[self.position];
            self.position += 1;
            if let Some(result) = self.pipeline.apply(document, |name| state.documents(name)) {
                self.buffer.push_back(result);
            }
        }

        log_trace!(
            self.logger,
            "Cursor on '{}' scanned {} documents, {} buffered",
            self.collection,
            self.position - start,
            self.buffer.len()
        );

        if self.position >= documents.len() {
            self.session = None;
        }
        Ok(())
    }

    /// Documents fetched but not yet yielded
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Iterator for MemoryCursor {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() {
            if let Err(err) = self.fetch_page() {
                return Some(Err(err));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

impl DocumentCursor for MemoryCursor {
    fn is_exhausted(&self) -> bool {
        self.session.is_none() && self.buffer.is_empty()
    }

    fn close(mut self) {
        log_trace!(
            self.logger,
            "Cursor on '{}' closed at position {}",
            self.collection,
            self.position
        );
        self.session = None;
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::{LookupStage, MatchStage};
    use crate::logging::LogLevel;
    use serde_json::json;

    fn started() -> MemoryStore {
        let mut store = MemoryStore::new(Logger::capturing(LogLevel::Trace).0);
        store.start("test").unwrap();
        store
    }

    fn users() -> CollectionName {
        CollectionName::new("user")
    }

    fn match_all() -> Pipeline {
        Pipeline::new(MatchStage::all(), Vec::new())
    }

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let store = started();
        let result = store
            .insert_many(&users(), vec![json!({"name": "a"}), json!({"name": "b"})])
            .unwrap();
        assert_eq!(result.inserted_count, 2);
        assert_eq!(result.inserted_ids, vec![DocumentId::Int(1), DocumentId::Int(2)]);

        let result = store.insert_many(&users(), vec![json!({"name": "c"})]).unwrap();
        assert_eq!(result.inserted_ids, vec![DocumentId::Int(3)]);
        assert_eq!(store.count(&users()), 3);
    }

    #[test]
    fn test_explicit_ids_kept_and_advance_counter() {
        let store = started();
        store
            .insert_many(
                &users(),
                vec![json!({"_id": 10}), json!({"_id": null}), json!({"_id": "x"})],
            )
            .unwrap();

        let docs: Vec<Value> = store
            .aggregate(&users(), &match_all())
            .unwrap()
            .map(|d| d.unwrap())
            .collect();
        assert_eq!(docs[0]["_id"], json!(10));
        assert_eq!(docs[1]["_id"], json!(11));
        assert_eq!(docs[2]["_id"], json!("x"));
    }

    #[test]
    fn test_rejected_batch_stores_nothing() {
        let store = started();
        store.insert_many(&users(), vec![json!({"_id": 1})]).unwrap();

        let err = store
            .insert_many(&users(), vec![json!({"_id": 2}), json!({"_id": 1})])
            .unwrap_err();
        assert!(matches!(err, JoinBaseError::WriteFailure(_)));

        let err = store
            .insert_many(&users(), vec![json!({"ok": true}), json!([1, 2])])
            .unwrap_err();
        assert!(matches!(err, JoinBaseError::WriteFailure(_)));

        let err = store
            .insert_many(&users(), vec![json!({"_id": {"nested": 1}})])
            .unwrap_err();
        assert!(matches!(err, JoinBaseError::WriteFailure(_)));

        assert_eq!(store.count(&users()), 1);
    }

    #[test]
    fn test_failed_first_batch_does_not_create_collection() {
        let store = started();
        assert!(store.insert_many(&users(), vec![json!(1)]).is_err());
        assert!(store.list_collections().is_empty());
    }

    #[test]
    fn test_invalid_collection_names() {
        let store = started();
        let bad = CollectionName::new("$bad");
        assert!(matches!(
            store.insert_many(&bad, vec![json!({})]),
            Err(JoinBaseError::WriteFailure(_))
        ));
        assert!(matches!(
            store.aggregate(&bad, &match_all()),
            Err(JoinBaseError::QueryFailure(_))
        ));

        let pipeline = Pipeline::new(
            MatchStage::all(),
            vec![LookupStage::new(CollectionName::new(""), "a", "b", "c")],
        );
        assert!(matches!(
            store.aggregate(&users(), &pipeline),
            Err(JoinBaseError::QueryFailure(_))
        ));
    }

    #[test]
    fn test_unexecutable_pipelines_are_query_failures() {
        let store = started();
        let cases = [
            Pipeline::new(
                MatchStage::new(vec![("$where".to_string(), json!("1"))]),
                Vec::new(),
            ),
            Pipeline::new(
                MatchStage::new(vec![("age".to_string(), json!({"$gt": 3}))]),
                Vec::new(),
            ),
            Pipeline::new(
                MatchStage::all(),
                vec![LookupStage::new(CollectionName::new("org"), "a", "b", "$c")],
            ),
            Pipeline::new(
                MatchStage::all(),
                vec![LookupStage::new(CollectionName::new("org"), "", "b", "c")],
            ),
        ];
        for pipeline in cases {
            assert!(matches!(
                store.aggregate(&users(), &pipeline),
                Err(JoinBaseError::QueryFailure(_))
            ));
        }
    }

    #[test]
    fn test_cursor_fails_after_stop() {
        let mut store = started();
        store.page_size = 1;
        store
            .insert_many(&users(), vec![json!({"n": 1}), json!({"n": 2})])
            .unwrap();

        let mut cursor = store.aggregate(&users(), &match_all()).unwrap();
        assert_eq!(cursor.next().unwrap().unwrap()["n"], json!(1));

        store.stop();
        assert!(matches!(
            cursor.next(),
            Some(Err(JoinBaseError::StoreNotStarted))
        ));
        assert!(cursor.next().is_none());
        assert!(cursor.is_exhausted());
    }

    #[test]
    fn test_with_config_rejects_zero_page_size() {
        let config = StoreConfig {
            page_size: 0,
            ..StoreConfig::default()
        };
        assert!(matches!(
            MemoryStore::with_config(&config, Logger::capturing(LogLevel::Warn).0),
            Err(JoinBaseError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_lifecycle() {
        let mut store = MemoryStore::new(Logger::capturing(LogLevel::Info).0);
        // stop before start is a no-op
        store.stop();
        assert!(matches!(
            store.insert_many(&users(), vec![json!({})]),
            Err(JoinBaseError::StoreNotStarted)
        ));
        assert!(matches!(
            store.aggregate(&users(), &match_all()),
            Err(JoinBaseError::StoreNotStarted)
        ));
        assert!(store.start(" ").is_err());
        assert!(!store.is_started());

        store.start("zendesk").unwrap();
        assert_eq!(store.store_name().as_deref(), Some("zendesk"));
        assert!(matches!(
            store.start("again"),
            Err(JoinBaseError::ConfigurationError(_))
        ));

        store.stop();
        store.stop();
        assert!(!store.is_started());
        assert_eq!(store.count(&users()), 0);
    }

    #[test]
    fn test_unknown_collection_yields_empty_cursor() {
        let store = started();
        let mut cursor = store
            .aggregate(&CollectionName::new("nothing"), &match_all())
            .unwrap();
        assert!(cursor.next().is_none());
        assert!(cursor.is_exhausted());
    }

    #[test]
    fn test_cursor_pages_lazily() {
        let mut store = MemoryStore::new(Logger::capturing(LogLevel::Warn).0);
        store.page_size = 10;
        store.start("paging").unwrap();
        let docs: Vec<Value> = (0..25).map(|i| json!({"n": i})).collect();
        store.insert_many(&users(), docs).unwrap();

        let mut cursor = store.aggregate(&users(), &match_all()).unwrap();
        let first = cursor.next().unwrap().unwrap();
        assert_eq!(first["n"], json!(0));
        assert_eq!(cursor.buffered(), 9);
        assert!(!cursor.is_exhausted());

        let rest = cursor.next_batch(100).unwrap();
        assert_eq!(rest.len(), 24);
        assert!(cursor.is_exhausted());
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_cursor_close_releases_session() {
        let mut store = started();
        store.page_size = 2;
        store
            .insert_many(&users(), (0..5).map(|i| json!({"n": i})).collect())
            .unwrap();

        let session = Arc::clone(store.session.as_ref().unwrap());
        let mut cursor = store.aggregate(&users(), &match_all()).unwrap();
        cursor.next();
        assert_eq!(Arc::strong_count(&session), 3);

        cursor.close();
        assert_eq!(Arc::strong_count(&session), 2);
    }
}
