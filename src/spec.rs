use std::{fmt, str::FromStr};

use serde::Serialize;
use serde_json::Value;

use crate::{Error, Result};

/// How many rows a finder hands back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Arity {
    /// First matching row, or nothing.
    Single,
    /// Every matching row, in result order.
    Many,
}

impl Arity {
    pub fn as_str(self) -> &'static str {
        match self {
            Arity::Single => "single",
            Arity::Many => "many",
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Arity {
    /// Parses an arity keyword, naming `finder` in the error.
    pub fn parse_for(finder: &str, value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "single" | "first" | "one" => Ok(Arity::Single),
            "many" | "all" => Ok(Arity::Many),
            other => Err(Error::definition(
                finder,
                format!("unsupported arity `{other}` (expected single/first or many/all)"),
            )),
        }
    }
}

impl FromStr for Arity {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        Self::parse_for("<arity>", value)
    }
}

/// Clause options for a finder. Every text option is raw SQL; only
/// `conditions`, `group`, `order`, `limit` and `offset` are scanned for
/// `:name` placeholders.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OptionSet {
    pub(crate) select: Option<String>,
    pub(crate) from: Option<String>,
    pub(crate) joins: Option<String>,
    pub(crate) conditions: Option<String>,
    pub(crate) group: Option<String>,
    pub(crate) order: Option<String>,
    pub(crate) limit: Option<String>,
    pub(crate) offset: Option<String>,
    pub(crate) positional: bool,
    pub(crate) prefetch: Option<Value>,
}

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.select = Some(columns.into());
        self
    }

    pub fn from(mut self, source: impl Into<String>) -> Self {
        self.from = Some(source.into());
        self
    }

    pub fn joins(mut self, joins: impl Into<String>) -> Self {
        self.joins = Some(joins.into());
        self
    }

    pub fn conditions(mut self, conditions: impl Into<String>) -> Self {
        self.conditions = Some(conditions.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    /// Accepts a number (`10`) or a placeholder (`":per_page"`).
    pub fn limit(mut self, limit: impl fmt::Display) -> Self {
        self.limit = Some(limit.to_string());
        self
    }

    /// Accepts a number (`20`) or a placeholder (`":skip"`).
    pub fn offset(mut self, offset: impl fmt::Display) -> Self {
        self.offset = Some(offset.to_string());
        self
    }

    pub fn positional(mut self, positional: bool) -> Self {
        self.positional = positional;
        self
    }

    /// Opaque settings handed to the model's [`Prefetch`](crate::Prefetch) hook.
    pub fn prefetch(mut self, settings: Value) -> Self {
        self.prefetch = Some(settings);
        self
    }

    pub fn select_clause(&self) -> Option<&str> {
        self.select.as_deref()
    }

    pub fn set_select(&mut self, columns: impl Into<String>) {
        self.select = Some(columns.into());
    }

    pub fn joins_clause(&self) -> Option<&str> {
        self.joins.as_deref()
    }

    pub fn set_joins(&mut self, joins: impl Into<String>) {
        self.joins = Some(joins.into());
    }

    pub fn limit_clause(&self) -> Option<&str> {
        self.limit.as_deref()
    }

    pub fn is_positional(&self) -> bool {
        self.positional
    }

    pub fn prefetch_settings(&self) -> Option<&Value> {
        self.prefetch.as_ref()
    }

    fn text_options(&self) -> [(&'static str, Option<&str>); 8] {
        [
            ("select", self.select.as_deref()),
            ("from", self.from.as_deref()),
            ("joins", self.joins.as_deref()),
            ("conditions", self.conditions.as_deref()),
            ("group", self.group.as_deref()),
            ("order", self.order.as_deref()),
            ("limit", self.limit.as_deref()),
            ("offset", self.offset.as_deref()),
        ]
    }
}

/// A finder definition before compilation. Consumed once by
/// [`Finders::define_spec`](crate::Finders::define_spec).
#[derive(Clone, Debug)]
pub struct FinderSpec {
    pub name: String,
    pub arity: Arity,
    pub options: OptionSet,
}

impl FinderSpec {
    pub fn new(name: impl Into<String>, arity: Arity, options: OptionSet) -> Result<Self> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(Error::definition(
                name,
                "finder names must be identifiers ([A-Za-z_][A-Za-z0-9_]*)",
            ));
        }
        for (key, value) in options.text_options() {
            if value.is_some_and(|v| v.trim().is_empty()) {
                return Err(Error::definition(name, format!("option `{key}` is blank")));
            }
        }
        Ok(Self {
            name,
            arity,
            options,
        })
    }

    /// Like [`FinderSpec::new`], with the arity given as a keyword
    /// (`single`, `first`, `many`, `all`).
    pub fn parse(name: impl Into<String>, arity: &str, options: OptionSet) -> Result<Self> {
        let name = name.into();
        let arity = Arity::parse_for(&name, arity)?;
        Self::new(name, arity, options)
    }

    /// Applies arity defaults: `Single` always fetches one row, whatever limit
    /// the caller supplied. `Many` keeps the caller's limit, if any.
    pub fn normalize(mut self) -> Self {
        self.options = normalize(self.options, self.arity);
        self
    }
}

pub fn normalize(mut options: OptionSet, arity: Arity) -> OptionSet {
    if arity == Arity::Single {
        options.limit = Some("1".to_string());
    }
    options
}

pub(crate) fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
