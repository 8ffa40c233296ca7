//! Test doubles for exercising finders without a database.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;

use crate::{Error, Result, backend::Connection, backend::quote_value};

/// Records every statement it is asked to execute and answers with canned
/// rows. Quoting follows the Postgres rules of [`PgBackend`](crate::PgBackend).
#[derive(Clone, Default)]
pub struct RecordingConnection {
    rows: Arc<Mutex<Vec<Value>>>,
    executed: Arc<Mutex<Vec<String>>>,
    failure: Option<String>,
    slow_query_threshold: Option<Duration>,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<Value>) -> Self {
        Self {
            rows: Arc::new(Mutex::new(rows)),
            ..Self::default()
        }
    }

    /// Every `execute` fails with `Error::Backend(message)`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = Some(threshold);
        self
    }

    pub fn set_rows(&self, rows: Vec<Value>) {
        *self.rows.lock().expect("rows poisoned") = rows;
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().expect("statement log poisoned").clone()
    }

    pub fn last_sql(&self) -> Option<String> {
        self.executed
            .lock()
            .expect("statement log poisoned")
            .last()
            .cloned()
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    fn quote(&self, value: &Value) -> Result<String> {
        quote_value(value)
    }

    async fn execute(&self, sql: &str) -> Result<Vec<Value>> {
        self.executed
            .lock()
            .expect("statement log poisoned")
            .push(sql.to_string());
        if let Some(message) = &self.failure {
            return Err(Error::Backend(message.clone()));
        }
        Ok(self.rows.lock().expect("rows poisoned").clone())
    }

    fn slow_query_threshold(&self) -> Option<Duration> {
        self.slow_query_threshold
    }
}
