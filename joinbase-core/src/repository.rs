// joinbase-core/src/repository.rs
// Search repository: one store session, its declared joins, loading and searching

use std::path::Path;

use crate::config::StoreConfig;
use crate::document::{CollectionName, DynamicRecord, Record};
use crate::error::{JoinBaseError, Result};
use crate::join_registry::JoinRegistry;
use crate::loader::{BatchLoader, LoadSummary};
use crate::logging::Logger;
use crate::query::{QueryCompiler, SearchClause};
use crate::storage::{MemoryStore, StoreGateway};
use crate::{log_debug, log_error, log_info};

/// Open the store engine named in `config`.
///
/// Fails with `ConfigurationError` for an unknown engine or invalid settings,
/// before any store is started.
pub fn open_gateway(config: &StoreConfig, logger: Logger) -> Result<MemoryStore> {
    if let Err(err) = config.validate() {
        log_error!(logger, "{}", err);
        return Err(err);
    }
    MemoryStore::with_config(config, logger)
}

/// Repository over the engine named in `config`, logging at the configured level
pub fn open_repository(config: &StoreConfig) -> Result<SearchRepository<MemoryStore>> {
    let logger = config.logger()?;
    let gateway = open_gateway(config, logger.clone())?;
    SearchRepository::new(gateway, config, logger)
}

/// Loads JSON entity collections and searches them with declared joins.
///
/// Generic over the store backend:
/// - `SearchRepository<MemoryStore>` - embedded in-memory store
/// - any other `StoreGateway`, e.g. test doubles
///
/// Lifecycle: `start` once before loading or searching, `stop` once at
/// shutdown. Dropping the repository stops the store as well.
pub struct SearchRepository<G: StoreGateway> {
    gateway: G,
    joins: JoinRegistry,
    loader: BatchLoader,
    compiler: QueryCompiler,
    logger: Logger,
}

impl<G: StoreGateway> SearchRepository<G> {
    /// `config` is expected to be validated already (see `open_gateway`);
    /// the loader still rejects a zero batch size.
    pub fn new(gateway: G, config: &StoreConfig, logger: Logger) -> Result<Self> {
        Ok(SearchRepository {
            gateway,
            joins: JoinRegistry::new(),
            loader: BatchLoader::new(config.batch_size, logger.clone())?,
            compiler: QueryCompiler::new(logger.clone()),
            logger,
        })
    }

    pub fn start(&mut self, store_name: &str) -> Result<()> {
        log_info!(self.logger, "Starting database server ...");
        self.gateway.start(store_name).map_err(|err| {
            log_error!(self.logger, "Could not start store '{}': {}", store_name, err);
            err
        })?;
        log_debug!(self.logger, "Database server started");
        Ok(())
    }

    /// Safe to call repeatedly and after a failed `start`
    pub fn stop(&mut self) {
        self.gateway.stop();
    }

    pub fn is_started(&self) -> bool {
        self.gateway.is_started()
    }

    /// Stream the JSON array at `path` into the collection of `R`
    pub fn load<R: Record>(&self, path: impl AsRef<Path>) -> Result<LoadSummary> {
        self.ensure_started()?;
        self.loader
            .load_file::<R, G>(&self.gateway, &R::collection_name(), path)
    }

    /// Stream the JSON array at `path` into `collection` without a record schema
    pub fn load_into(
        &self,
        collection: &CollectionName,
        path: impl AsRef<Path>,
    ) -> Result<LoadSummary> {
        self.ensure_started()?;
        self.loader
            .load_file::<DynamicRecord, G>(&self.gateway, collection, path)
    }

    /// Declare `L.left_field == R.right_field`; results for `L` gain an
    /// `<l>_<r>` array of matching `R` documents
    pub fn leftjoin<L: Record, R: Record>(&self, left_field: &str, right_field: &str) {
        self.joins.register::<L, R>(left_field, right_field);
    }

    /// `leftjoin` for collections known by name
    pub fn leftjoin_names(
        &self,
        left: CollectionName,
        left_field: &str,
        right: CollectionName,
        right_field: &str,
    ) {
        self.joins
            .register_names(left, left_field, right, right_field);
    }

    /// Search the collection of `R`
    pub fn search<R: Record>(&self, clauses: &SearchClause) -> Result<G::Cursor> {
        self.search_in(&R::collection_name(), clauses)
    }

    /// Search `collection`
    pub fn search_in(
        &self,
        collection: &CollectionName,
        clauses: &SearchClause,
    ) -> Result<G::Cursor> {
        self.ensure_started()?;
        let pipeline = self
            .compiler
            .compile_for(collection, clauses, &self.joins)?;
        self.gateway.aggregate(collection, &pipeline).map_err(|err| {
            log_error!(self.logger, "Search on '{}' failed: {}", collection, err);
            err
        })
    }

    pub fn joins(&self) -> &JoinRegistry {
        &self.joins
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    fn ensure_started(&self) -> Result<()> {
        if self.gateway.is_started() {
            Ok(())
        } else {
            Err(JoinBaseError::StoreNotStarted)
        }
    }
}

impl<G: StoreGateway> Drop for SearchRepository<G> {
    fn drop(&mut self) {
        self.gateway.stop();
    }
}
