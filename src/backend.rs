use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    Error, Result,
    placeholder::{ClauseTemplate, TemplateBuilder},
    spec::OptionSet,
};

/// The database side of a finder: quoting, pagination syntax and execution.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Renders `value` as a SQL literal safe to splice into statement text.
    fn quote(&self, value: &Value) -> Result<String>;

    /// Appends pagination syntax. `limit` and `offset` have already been
    /// scanned for placeholders.
    fn apply_pagination(
        &self,
        builder: &mut TemplateBuilder,
        limit: Option<&ClauseTemplate>,
        offset: Option<&ClauseTemplate>,
    ) {
        if let Some(limit) = limit {
            builder.push(" LIMIT ").push_template(limit);
        }
        if let Some(offset) = offset {
            builder.push(" OFFSET ").push_template(offset);
        }
    }

    /// Runs fully substituted SQL and returns one JSON object per row, in
    /// result order.
    async fn execute(&self, sql: &str) -> Result<Vec<Value>>;

    /// Executions slower than this are logged on `rillfind::slow_query`.
    /// `None` leaves the choice to the caller.
    fn slow_query_threshold(&self) -> Option<Duration> {
        None
    }
}

/// A type finders can be defined on.
pub trait Model: DeserializeOwned + Send + 'static {
    fn table_name() -> &'static str;

    /// Partitioned type hierarchy membership, when the model has one.
    fn inheritance() -> Option<Box<dyn Inheritance>> {
        None
    }

    fn prefetch() -> Option<Box<dyn Prefetch>> {
        None
    }

    fn from_row(row: Value) -> Result<Self> {
        serde_json::from_value(row).map_err(Into::into)
    }
}

pub trait Inheritance: Send + Sync {
    fn is_hierarchy_root(&self) -> bool;

    /// Predicate restricting rows to this type and its descendants.
    fn type_restriction_predicate(&self) -> Option<String>;
}

/// Association prefetching. May rewrite the options (extra columns or joins)
/// before the finder is assembled.
pub trait Prefetch: Send + Sync {
    fn rewrite(&self, options: &mut OptionSet) -> Result<()>;
}

/// Several types sharing one table, told apart by a type column.
#[derive(Clone, Debug)]
pub struct SingleTableInheritance {
    column: String,
    type_names: Vec<String>,
    root: bool,
}

impl SingleTableInheritance {
    /// The hierarchy root sees every row and gets no predicate.
    pub fn root(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            type_names: Vec::new(),
            root: true,
        }
    }

    /// A subtype; `type_names` lists the type itself and its descendants.
    pub fn subtype<I, S>(column: impl Into<String>, type_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            column: column.into(),
            type_names: type_names.into_iter().map(Into::into).collect(),
            root: false,
        }
    }
}

impl Inheritance for SingleTableInheritance {
    fn is_hierarchy_root(&self) -> bool {
        self.root
    }

    fn type_restriction_predicate(&self) -> Option<String> {
        if self.root || self.type_names.is_empty() {
            return None;
        }
        let column = quote_ident(&self.column);
        let predicate = self
            .type_names
            .iter()
            .map(|name| format!("{column} = {}", quote_str(name)))
            .collect::<Vec<_>>()
            .join(" OR ");
        Some(predicate)
    }
}

pub fn quote_ident(value: &str) -> String {
    let escaped = value.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

pub fn quote_str(value: &str) -> String {
    let escaped = value.replace('\'', "''");
    format!("'{}'", escaped)
}

/// Postgres literal quoting for JSON argument values.
///
/// Arrays expand to a comma separated list so `IN (:ids)` works; objects are
/// passed as quoted JSON text.
pub fn quote_value(value: &Value) -> Result<String> {
    match value {
        Value::Null => Ok("NULL".to_string()),
        Value::Bool(true) => Ok("TRUE".to_string()),
        Value::Bool(false) => Ok("FALSE".to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => {
            if s.contains('\0') {
                return Err(Error::Backend(
                    "string arguments may not contain NUL bytes".into(),
                ));
            }
            Ok(quote_str(s))
        }
        Value::Array(items) => {
            if items.is_empty() {
                return Ok("NULL".to_string());
            }
            let quoted = items.iter().map(quote_value).collect::<Result<Vec<_>>>()?;
            Ok(quoted.join(", "))
        }
        Value::Object(_) => Ok(quote_str(&value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quotes_scalars() {
        assert_eq!(quote_value(&json!("martin")).unwrap(), "'martin'");
        assert_eq!(quote_value(&json!("O'Brien")).unwrap(), "'O''Brien'");
        assert_eq!(quote_value(&json!(1)).unwrap(), "1");
        assert_eq!(quote_value(&json!(2.5)).unwrap(), "2.5");
        assert_eq!(quote_value(&json!(true)).unwrap(), "TRUE");
        assert_eq!(quote_value(&Value::Null).unwrap(), "NULL");
    }

    #[test]
    fn quotes_arrays_as_lists() {
        assert_eq!(quote_value(&json!([1, 2, 3])).unwrap(), "1, 2, 3");
        assert_eq!(quote_value(&json!(["a", "b"])).unwrap(), "'a', 'b'");
        assert_eq!(quote_value(&json!([])).unwrap(), "NULL");
    }

    #[test]
    fn quotes_objects_as_json_text() {
        assert_eq!(
            quote_value(&json!({"k": "it's"})).unwrap(),
            r#"'{"k":"it''s"}'"#
        );
    }

    #[test]
    fn rejects_nul_bytes() {
        assert!(matches!(
            quote_value(&json!("a\0b")),
            Err(Error::Backend(_))
        ));
    }

    #[test]
    fn quote_handles_quotes() {
        assert_eq!(quote_ident("weird\"name"), "\"weird\"\"name\"");
    }

    #[test]
    fn subtype_predicate_lists_descendants() {
        let sti = SingleTableInheritance::subtype("type", ["Admin", "SuperAdmin"]);
        assert!(!sti.is_hierarchy_root());
        assert_eq!(
            sti.type_restriction_predicate().as_deref(),
            Some("\"type\" = 'Admin' OR \"type\" = 'SuperAdmin'")
        );
        assert_eq!(SingleTableInheritance::root("type").type_restriction_predicate(), None);
    }
}
