// src/loader.rs
//! Streaming bulk loader
//!
//! Reads a JSON array one element at a time and commits the records to the
//! store in fixed-size batches. Memory use is bounded by one batch regardless
//! of the source size.
//!
//! Failure policy: a parse error, read error or rejected insert stops the
//! load. Batches committed before the failure stay in the store; records
//! buffered but not yet committed are dropped.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::marker::PhantomData;
use std::path::Path;

use serde::de::{self, DeserializeOwned, SeqAccess, Visitor};
use serde::{Deserializer as _, Serialize};
use serde_json::error::Category;
use serde_json::Value;

use crate::config::DEFAULT_BATCH_SIZE;
use crate::document::CollectionName;
use crate::error::{JoinBaseError, Result};
use crate::logging::Logger;
use crate::storage::StoreGateway;
use crate::{log_debug, log_error, log_info};

/// Outcome of a successful load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub collection: CollectionName,
    pub records: usize,
    pub batches: usize,
}

#[derive(Debug, Clone)]
pub struct BatchLoader {
    batch_size: usize,
    logger: Logger,
}

impl BatchLoader {
    pub fn new(batch_size: usize, logger: Logger) -> Result<Self> {
        if batch_size == 0 {
            return Err(JoinBaseError::ConfigurationError(
                "Batch size must be at least 1".to_string(),
            ));
        }
        Ok(BatchLoader { batch_size, logger })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Load the JSON array stored at `path` into `collection`.
    ///
    /// Fails with `SourceNotFound` before touching the store if the file does
    /// not exist.
    pub fn load_file<T, G>(
        &self,
        gateway: &G,
        collection: &CollectionName,
        path: impl AsRef<Path>,
    ) -> Result<LoadSummary>
    where
        T: DeserializeOwned + Serialize,
        G: StoreGateway,
    {
        let path = path.as_ref();
        let source_name = path.display().to_string();

        let file = File::open(path).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                log_error!(self.logger, "JSON file not found({})", source_name);
                JoinBaseError::SourceNotFound {
                    path: source_name.clone(),
                }
            } else {
                log_error!(
                    self.logger,
                    "Could not open JSON file({}): {}",
                    source_name,
                    err
                );
                JoinBaseError::IoFailure {
                    source_name: source_name.clone(),
                    message: err.to_string(),
                }
            }
        })?;

        self.load_reader::<T, G, _>(gateway, collection, &source_name, file)
    }

    /// Load a JSON array read from `reader` into `collection`.
    ///
    /// `source_name` only labels errors and log lines.
    pub fn load_reader<T, G, R>(
        &self,
        gateway: &G,
        collection: &CollectionName,
        source_name: &str,
        reader: R,
    ) -> Result<LoadSummary>
    where
        T: DeserializeOwned + Serialize,
        G: StoreGateway,
        R: Read,
    {
        log_info!(self.logger, "Loading {}s into database ...", collection);

        let mut sink = BatchSink {
            gateway,
            collection,
            logger: &self.logger,
            buffer: Vec::with_capacity(self.batch_size),
            batch_size: self.batch_size,
            records: 0,
            batches: 0,
            failure: None,
        };

        let mut deserializer = serde_json::Deserializer::from_reader(BufReader::new(reader));
        let outcome = deserializer
            .deserialize_seq(RecordStream {
                sink: &mut sink,
                _record: PhantomData::<T>,
            })
            .and_then(|()| deserializer.end());

        if let Err(err) = outcome {
            let failure = sink
                .failure
                .take()
                .unwrap_or_else(|| classify_parse_error(err, source_name));
            log_error!(
                self.logger,
                "Loading {}s from {} failed after {} committed batch(es): {}",
                collection,
                source_name,
                sink.batches,
                failure
            );
            return Err(failure);
        }

        log_debug!(
            self.logger,
            "Loading {}s is finished ({} records, {} batches)",
            collection,
            sink.records,
            sink.batches
        );

        Ok(LoadSummary {
            collection: collection.clone(),
            records: sink.records,
            batches: sink.batches,
        })
    }
}

impl Default for BatchLoader {
    fn default() -> Self {
        BatchLoader {
            batch_size: DEFAULT_BATCH_SIZE,
            logger: Logger::default(),
        }
    }
}

fn classify_parse_error(err: serde_json::Error, source_name: &str) -> JoinBaseError {
    match err.classify() {
        Category::Io => JoinBaseError::IoFailure {
            source_name: source_name.to_string(),
            message: err.to_string(),
        },
        Category::Syntax | Category::Data | Category::Eof => JoinBaseError::MalformedInput {
            source_name: source_name.to_string(),
            message: err.to_string(),
        },
    }
}

/// Buffer of parsed records waiting for the next commit
struct BatchSink<'a, G> {
    gateway: &'a G,
    collection: &'a CollectionName,
    logger: &'a Logger,
    buffer: Vec<Value>,
    batch_size: usize,
    records: usize,
    batches: usize,
    /// Store or serialization error that aborted the stream
    failure: Option<JoinBaseError>,
}

impl<G: StoreGateway> BatchSink<'_, G> {
    fn push(&mut self, document: Value) -> Result<()> {
        self.buffer.push(document);
        if self.buffer.len() == self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Commit the buffered records as one insert
    fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        let size = batch.len();
        self.gateway.insert_many(self.collection, batch)?;
        self.records += size;
        self.batches += 1;

        log_debug!(
            self.logger,
            "Committed batch {} of {} {}s ({} so far)",
            self.batches,
            size,
            self.collection,
            self.records
        );
        Ok(())
    }

    /// Keep the real error and hand serde a placeholder to unwind the parser
    fn abort<E: de::Error>(&mut self, err: JoinBaseError) -> E {
        let message = err.to_string();
        self.failure = Some(err);
        E::custom(message)
    }
}

/// Visits the top-level array, pushing each element into the sink
struct RecordStream<'s, 'a, T, G> {
    sink: &'s mut BatchSink<'a, G>,
    _record: PhantomData<T>,
}

impl<'de, T, G> Visitor<'de> for RecordStream<'_, '_, T, G>
where
    T: DeserializeOwned + Serialize,
    G: StoreGateway,
{
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a JSON array of records")
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        while let Some(record) = seq.next_element::<T>()? {
            let document = match serde_json::to_value(&record) {
                Ok(document) => document,
                Err(err) => return Err(self.sink.abort(err.into())),
            };
            if let Err(err) = self.sink.push(document) {
                return Err(self.sink.abort(err));
            }
        }

        self.sink.flush().map_err(|err| self.sink.abort(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::Pipeline;
    use crate::document::DynamicRecord;
    use crate::logging::LogLevel;
    use crate::storage::{InsertManyResult, MemoryCursor};
    use parking_lot::Mutex;
    use serde::Deserialize;
    use std::io::Cursor;

    /// Records batch sizes; optionally rejects the n-th insert
    #[derive(Default)]
    struct RecordingGateway {
        batches: Mutex<Vec<usize>>,
        fail_on_call: Option<usize>,
    }

    impl StoreGateway for RecordingGateway {
        type Cursor = MemoryCursor;

        fn start(&mut self, _store_name: &str) -> Result<()> {
            Ok(())
        }

        fn stop(&mut self) {}

        fn is_started(&self) -> bool {
            true
        }

        fn insert_many(
            &self,
            _collection: &CollectionName,
            documents: Vec<Value>,
        ) -> Result<InsertManyResult> {
            let mut batches = self.batches.lock();
            if self.fail_on_call == Some(batches.len() + 1) {
                return Err(JoinBaseError::WriteFailure("rejected".to_string()));
            }
            batches.push(documents.len());
            Ok(InsertManyResult {
                inserted_ids: Vec::new(),
                inserted_count: documents.len(),
            })
        }

        fn aggregate(&self, _: &CollectionName, _: &Pipeline) -> Result<MemoryCursor> {
            Err(JoinBaseError::QueryFailure("not supported".to_string()))
        }
    }

    fn loader(batch_size: usize) -> BatchLoader {
        BatchLoader::new(batch_size, Logger::capturing(LogLevel::Trace).0).unwrap()
    }

    fn array_of(n: usize) -> String {
        let items: Vec<String> = (0..n).map(|i| format!(r#"{{"n": {}}}"#, i)).collect();
        format!("[{}]", items.join(","))
    }

    fn load(loader: &BatchLoader, gateway: &RecordingGateway, json: &str) -> Result<LoadSummary> {
        loader.load_reader::<DynamicRecord, _, _>(
            gateway,
            &CollectionName::new("user"),
            "inline",
            Cursor::new(json.as_bytes()),
        )
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(matches!(
            BatchLoader::new(0, Logger::default()),
            Err(JoinBaseError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_remainder_flushed_at_end() {
        let gateway = RecordingGateway::default();
        let summary = load(&loader(100), &gateway, &array_of(250)).unwrap();

        assert_eq!(*gateway.batches.lock(), vec![100, 100, 50]);
        assert_eq!(summary.records, 250);
        assert_eq!(summary.batches, 3);
    }

    #[test]
    fn test_exact_multiple_has_no_empty_flush() {
        let gateway = RecordingGateway::default();
        load(&loader(10), &gateway, &array_of(30)).unwrap();
        assert_eq!(*gateway.batches.lock(), vec![10, 10, 10]);
    }

    #[test]
    fn test_empty_array_issues_no_insert() {
        let gateway = RecordingGateway::default();
        let summary = load(&loader(10), &gateway, " [ ] ").unwrap();
        assert!(gateway.batches.lock().is_empty());
        assert_eq!(summary.records, 0);
    }

    #[test]
    fn test_syntax_error_keeps_committed_batches() {
        let gateway = RecordingGateway::default();
        let mut json = array_of(250);
        json.truncate(json.len() - 1);
        json.push_str(", {\"n\": }]");

        let err = load(&loader(100), &gateway, &json).unwrap_err();
        assert!(matches!(err, JoinBaseError::MalformedInput { .. }));
        assert_eq!(*gateway.batches.lock(), vec![100, 100]);
    }

    #[test]
    fn test_non_array_and_truncated_sources_are_malformed() {
        for json in [r#"{"n": 1}"#, "", "[{\"n\": 1}", "[{\"n\": 1}]x"] {
            let gateway = RecordingGateway::default();
            let err = load(&loader(10), &gateway, json).unwrap_err();
            assert!(
                matches!(err, JoinBaseError::MalformedInput { .. }),
                "expected MalformedInput for {:?}, got {:?}",
                json,
                err
            );
        }
    }

    #[test]
    fn test_record_shape_mismatch_is_malformed() {
        #[derive(Serialize, Deserialize)]
        struct Strict {
            n: u32,
        }

        let gateway = RecordingGateway::default();
        let err = loader(2)
            .load_reader::<Strict, _, _>(
                &gateway,
                &CollectionName::new("strict"),
                "inline",
                Cursor::new(&br#"[{"n": 1}, {"n": 2}, {"n": "three"}]"#[..]),
            )
            .unwrap_err();

        assert!(matches!(err, JoinBaseError::MalformedInput { .. }));
        assert_eq!(*gateway.batches.lock(), vec![2]);
    }

    #[test]
    fn test_write_failure_stops_the_stream() {
        let gateway = RecordingGateway {
            fail_on_call: Some(2),
            ..Default::default()
        };
        let err = load(&loader(10), &gateway, &array_of(45)).unwrap_err();

        assert!(matches!(err, JoinBaseError::WriteFailure(_)));
        assert_eq!(*gateway.batches.lock(), vec![10]);
    }

    #[test]
    fn test_write_failure_on_final_flush() {
        let gateway = RecordingGateway {
            fail_on_call: Some(3),
            ..Default::default()
        };
        let err = load(&loader(10), &gateway, &array_of(25)).unwrap_err();
        assert!(matches!(err, JoinBaseError::WriteFailure(_)));
        assert_eq!(*gateway.batches.lock(), vec![10, 10]);
    }

    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "disk went away"));
            }
            self.served = true;
            let chunk = br#"[{"n": 1}, "#;
            buf[..chunk.len()].copy_from_slice(chunk);
            Ok(chunk.len())
        }
    }

    #[test]
    fn test_read_error_is_io_failure() {
        let gateway = RecordingGateway::default();
        let err = loader(10)
            .load_reader::<DynamicRecord, _, _>(
                &gateway,
                &CollectionName::new("user"),
                "flaky",
                FailingReader { served: false },
            )
            .unwrap_err();

        match err {
            JoinBaseError::IoFailure { source_name, .. } => assert_eq!(source_name, "flaky"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(gateway.batches.lock().is_empty());
    }

    #[test]
    fn test_missing_file_is_source_not_found() {
        let gateway = RecordingGateway::default();
        let err = loader(10)
            .load_file::<DynamicRecord, _>(
                &gateway,
                &CollectionName::new("user"),
                "/nonexistent/dir/users.json",
            )
            .unwrap_err();

        assert!(matches!(err, JoinBaseError::SourceNotFound { .. }));
        assert!(gateway.batches.lock().is_empty());
    }
}
