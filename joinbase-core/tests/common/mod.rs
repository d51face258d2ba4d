// Shared fixtures for integration tests

#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;

use joinbase_core::{
    CollectionName, InsertManyResult, JoinBaseError, MemoryCursor, Pipeline, Record, Result,
    StoreGateway,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::TempDir;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none", default)]
    pub id: Option<i64>,
    pub name: String,
    pub alias: String,
    #[serde(default)]
    pub organization_id: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Record for User {
    const TYPE_NAME: &'static str = "User";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    #[serde(rename = "_id")]
    pub id: i64,
    pub name: String,
}

impl Record for Organization {
    const TYPE_NAME: &'static str = "Organization";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    #[serde(rename = "_id")]
    pub id: String,
    pub subject: String,
    pub submitter_id: i64,
    #[serde(default)]
    pub organization_id: Option<i64>,
}

impl Record for Ticket {
    const TYPE_NAME: &'static str = "Ticket";
}

/// Directory of JSON sources that lives as long as the test
pub struct Fixtures {
    dir: TempDir,
}

impl Fixtures {
    pub fn new() -> Self {
        Fixtures {
            dir: TempDir::new().unwrap(),
        }
    }

    /// Write raw text to `name` and return its path
    pub fn write_raw(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    /// Write `value` as pretty JSON to `name` and return its path
    pub fn write_json(&self, name: &str, value: &Value) -> PathBuf {
        self.write_raw(name, &serde_json::to_string_pretty(value).unwrap())
    }

    pub fn missing(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// `n` records `{"seq": i, "name": "record-i"}` as a JSON array string
pub fn numbered_records(n: usize) -> String {
    let records: Vec<Value> = (0..n)
        .map(|i| serde_json::json!({"seq": i, "name": format!("record-{}", i)}))
        .collect();
    serde_json::to_string(&records).unwrap()
}

/// Gateway that records every insert call and rejects all queries
#[derive(Default)]
pub struct RecordingGateway {
    pub inserts: Mutex<Vec<(CollectionName, usize)>>,
    pub started: bool,
}

impl RecordingGateway {
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.inserts.lock().iter().map(|(_, n)| *n).collect()
    }

    pub fn insert_calls(&self) -> usize {
        self.inserts.lock().len()
    }
}

impl StoreGateway for RecordingGateway {
    type Cursor = MemoryCursor;

    fn start(&mut self, _store_name: &str) -> Result<()> {
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.started = false;
    }

    fn is_started(&self) -> bool {
        self.started
    }

    fn insert_many(
        &self,
        collection: &CollectionName,
        documents: Vec<Value>,
    ) -> Result<InsertManyResult> {
        self.inserts.lock().push((collection.clone(), documents.len()));
        Ok(InsertManyResult {
            inserted_ids: Vec::new(),
            inserted_count: documents.len(),
        })
    }

    fn aggregate(&self, _collection: &CollectionName, _pipeline: &Pipeline) -> Result<MemoryCursor> {
        Err(JoinBaseError::QueryFailure("recording gateway has no data".to_string()))
    }
}
