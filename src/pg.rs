use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value};
use sqlx::{
    Column, Decode, PgPool, Postgres, Row, TypeInfo, ValueRef,
    postgres::{PgConnectOptions, PgPoolOptions, PgRow},
};

use crate::{Error, Result, backend::Connection, backend::quote_value, config::BackendConfig};

/// Postgres [`Connection`] over a sqlx pool.
///
/// Finder SQL is sent as written over the simple query protocol, so every
/// value arrives as text and is mapped to JSON by column type. Rows keep the
/// order the statement produced.
#[derive(Clone, Debug)]
pub struct PgBackend {
    pool: PgPool,
    slow_query_threshold: Option<Duration>,
}

impl PgBackend {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url).await?;
        Ok(Self::from_pool(pool))
    }

    pub fn builder(url: impl Into<String>) -> PgBackendBuilder {
        PgBackendBuilder::new(url)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            slow_query_threshold: None,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Connection for PgBackend {
    fn quote(&self, value: &Value) -> Result<String> {
        quote_value(value)
    }

    async fn execute(&self, sql: &str) -> Result<Vec<Value>> {
        let rows = sqlx::raw_sql(sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_json).collect()
    }

    fn slow_query_threshold(&self) -> Option<Duration> {
        self.slow_query_threshold
    }
}

/// One JSON object per row, keyed by column name. Two columns with the same
/// name cannot both be kept, so they fail the call instead.
fn row_to_json(row: &PgRow) -> Result<Value> {
    let mut object = JsonMap::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_string();
            let text = <&str as Decode<'_, Postgres>>::decode(raw).map_err(sqlx::Error::Decode)?;
            text_to_json(&type_name, text)
        };
        if object.insert(column.name().to_string(), value).is_some() {
            return Err(Error::Backend(format!(
                "column `{}` appears more than once in the result; alias it in `select`",
                column.name()
            )));
        }
    }
    Ok(Value::Object(object))
}

/// Maps a value in Postgres text format to JSON. Types without a JSON
/// counterpart stay text.
fn text_to_json(type_name: &str, text: &str) -> Value {
    let parsed = match type_name {
        "BOOL" => return Value::Bool(text == "t"),
        "INT2" | "INT4" | "INT8" | "OID" => text.parse::<i64>().ok().map(Value::from),
        "FLOAT4" | "FLOAT8" | "NUMERIC" => serde_json::from_str(text).ok().map(Value::Number),
        "JSON" | "JSONB" => serde_json::from_str(text).ok(),
        _ => None,
    };
    parsed.unwrap_or_else(|| Value::String(text.to_string()))
}

pub struct PgBackendBuilder {
    url: String,
    max_connections: Option<u32>,
    connect_timeout: Option<Duration>,
    statement_cache_capacity: Option<usize>,
    slow_query_threshold: Option<Duration>,
}

impl PgBackendBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: None,
            connect_timeout: None,
            statement_cache_capacity: None,
            slow_query_threshold: None,
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        let mut builder =
            Self::new(config.database_url.clone()).slow_query_threshold(config.slow_query_threshold);
        if let Some(max) = config.max_connections {
            builder = builder.max_connections(max);
        }
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        builder
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max.max(1));
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Hint for the prepared statement cache. Finder SQL is literal text, so
    /// each distinct argument set is a distinct statement.
    pub fn statement_cache_capacity(mut self, size: usize) -> Self {
        self.statement_cache_capacity = Some(size.max(1));
        self
    }

    /// Carried by the backend; [`Finders`](crate::Finders) built on it log
    /// calls slower than this.
    pub fn slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = Some(threshold);
        self
    }

    pub async fn build(self) -> Result<PgBackend> {
        let mut opts = PgPoolOptions::new();
        if let Some(max) = self.max_connections {
            opts = opts.max_connections(max);
        }
        if let Some(t) = self.connect_timeout {
            opts = opts.acquire_timeout(t);
        }
        let pool = if let Some(cap) = self.statement_cache_capacity {
            let connect_opts = PgConnectOptions::from_str(&self.url)
                .map_err(|e| sqlx::Error::Configuration(Box::new(e)))?
                .statement_cache_capacity(cap);
            opts.connect_with(connect_opts).await?
        } else {
            opts.connect(&self.url).await?
        };
        Ok(PgBackend {
            pool,
            slow_query_threshold: self.slow_query_threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_config_carries_every_setting() {
        let mut config = BackendConfig::new("postgres://localhost/app");
        config.max_connections = Some(0);
        config.connect_timeout = Some(Duration::from_secs(3));
        config.slow_query_threshold = Duration::from_millis(1);

        let builder = PgBackendBuilder::from_config(&config);
        assert_eq!(builder.url, "postgres://localhost/app");
        assert_eq!(builder.max_connections, Some(1));
        assert_eq!(builder.connect_timeout, Some(Duration::from_secs(3)));
        assert_eq!(builder.slow_query_threshold, Some(Duration::from_millis(1)));
    }

    #[test]
    fn text_values_map_by_type() {
        assert_eq!(text_to_json("BOOL", "t"), json!(true));
        assert_eq!(text_to_json("BOOL", "f"), json!(false));
        assert_eq!(text_to_json("INT8", "-42"), json!(-42));
        assert_eq!(text_to_json("NUMERIC", "12.5"), json!(12.5));
        assert_eq!(text_to_json("FLOAT8", "NaN"), json!("NaN"));
        assert_eq!(text_to_json("JSONB", r#"{"a": [1]}"#), json!({"a": [1]}));
        assert_eq!(text_to_json("TEXT", "42"), json!("42"));
        assert_eq!(
            text_to_json("TIMESTAMPTZ", "2024-01-02 03:04:05+00"),
            json!("2024-01-02 03:04:05+00")
        );
    }
}
