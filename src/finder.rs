use std::{
    collections::HashMap,
    fmt,
    marker::PhantomData,
    sync::Arc,
    time::{Duration, Instant},
};

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::{
    Error, Result,
    assemble::{ModelInfo, assemble},
    backend::{Connection, Model},
    metrics,
    placeholder::{ClauseTemplate, ParameterOrder},
    spec::{Arity, FinderSpec, OptionSet},
};

const DEFAULT_SLOW_QUERY_THRESHOLD: Duration = Duration::from_millis(500);

/// A finder after compilation. Holds no argument values.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledFinder {
    name: String,
    arity: Arity,
    template: ClauseTemplate,
    parameter_order: ParameterOrder,
    positional: bool,
}

impl CompiledFinder {
    /// Normalizes, assembles and binds `spec` for the given model.
    pub fn compile(spec: FinderSpec, model: &ModelInfo, connection: &dyn Connection) -> Result<Self> {
        let FinderSpec {
            name,
            arity,
            options,
        } = spec.normalize();
        let positional = options.is_positional();
        let (template, parameter_order) = assemble(options, model, connection)?;
        Ok(Self {
            name,
            arity,
            template,
            parameter_order,
            positional,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub fn template(&self) -> &ClauseTemplate {
        &self.template
    }

    pub fn parameter_order(&self) -> &ParameterOrder {
        &self.parameter_order
    }

    pub fn is_positional(&self) -> bool {
        self.positional
    }

    /// The template with `:name` markers in place of slots.
    pub fn sql_template(&self) -> String {
        self.template.with_markers(&self.parameter_order)
    }

    /// Quotes `args` through `connection` and returns the final SQL text.
    pub fn render(&self, args: &Args, connection: &dyn Connection) -> Result<String> {
        let values = self.resolve(args)?;
        let quoted = values
            .into_iter()
            .map(|value| connection.quote(value))
            .collect::<Result<Vec<_>>>()?;
        self.template.render(|slot| {
            quoted
                .get(slot)
                .cloned()
                .ok_or_else(|| Error::mismatch(&self.name, format!("no value for slot {slot}")))
        })
    }

    /// Renders, executes and shapes one call. Timing, the slow query log and
    /// the call counters all happen here.
    #[instrument(skip_all, fields(finder = %self.name))]
    pub async fn fetch(
        &self,
        args: &Args,
        connection: &dyn Connection,
        slow_query_threshold: Duration,
    ) -> Result<Found<Value>> {
        let result = self.run(args, connection, slow_query_threshold).await;
        if result.is_err() {
            metrics::record_finder_failure();
        }
        result
    }

    async fn run(
        &self,
        args: &Args,
        connection: &dyn Connection,
        slow_query_threshold: Duration,
    ) -> Result<Found<Value>> {
        let sql = self.render(args, connection)?;

        let start = Instant::now();
        let rows = connection.execute(&sql).await?;
        let elapsed = start.elapsed();
        metrics::record_finder_call(rows.len(), elapsed);
        if elapsed > slow_query_threshold {
            warn!(target: "rillfind::slow_query", finder = %self.name, elapsed_ms = elapsed.as_millis() as u64, sql = %sql, "slow finder query");
        }

        Ok(match self.arity {
            Arity::Single => Found::One(rows.into_iter().next()),
            Arity::Many => Found::Many(rows),
        })
    }

    fn resolve<'a>(&self, args: &'a Args) -> Result<Vec<&'a Value>> {
        let expected = self.parameter_order.len();
        match args {
            Args::Positional(values) => {
                if expected > 0 && !self.positional {
                    return Err(Error::mismatch(
                        &self.name,
                        "finder takes named arguments, got positional ones",
                    ));
                }
                if values.len() != expected {
                    return Err(Error::mismatch(
                        &self.name,
                        format!("expected {expected} arguments, got {}", values.len()),
                    ));
                }
                Ok(values.iter().collect())
            }
            Args::Named(values) => {
                let Value::Object(map) = values else {
                    return Err(Error::mismatch(
                        &self.name,
                        format!("named arguments must be a JSON object, got {}", kind_of(values)),
                    ));
                };
                if expected > 0 && self.positional {
                    return Err(Error::mismatch(
                        &self.name,
                        "finder takes positional arguments, got a mapping",
                    ));
                }
                self.parameter_order
                    .names()
                    .iter()
                    .map(|name| {
                        map.get(name).ok_or_else(|| {
                            Error::mismatch(&self.name, format!("missing argument `{name}`"))
                        })
                    })
                    .collect()
            }
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl fmt::Display for CompiledFinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name, self.arity, self.sql_template())
    }
}

/// Call-time arguments for a finder.
#[derive(Clone, Debug, PartialEq)]
pub enum Args {
    /// One value per distinct placeholder, in first-occurrence order.
    Positional(Vec<Value>),
    /// A JSON object keyed by placeholder name; extra keys are ignored.
    /// Anything other than an object is rejected at call time.
    Named(Value),
}

impl Args {
    pub fn none() -> Self {
        Self::Positional(Vec::new())
    }

    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }

    pub fn named(values: Value) -> Self {
        Self::Named(values)
    }
}

/// Rows shaped by the finder's arity.
#[derive(Debug, PartialEq)]
pub enum Found<M> {
    One(Option<M>),
    Many(Vec<M>),
}

impl<M> Found<M> {
    /// The single row; for `Many` results, the first one.
    pub fn into_one(self) -> Option<M> {
        match self {
            Found::One(row) => row,
            Found::Many(rows) => rows.into_iter().next(),
        }
    }

    pub fn into_many(self) -> Vec<M> {
        match self {
            Found::One(row) => row.into_iter().collect(),
            Found::Many(rows) => rows,
        }
    }

    /// Maps every row, keeping the shape.
    pub fn try_map<U>(self, f: impl FnMut(M) -> Result<U>) -> Result<Found<U>> {
        Ok(match self {
            Found::One(row) => Found::One(row.map(f).transpose()?),
            Found::Many(rows) => Found::Many(rows.into_iter().map(f).collect::<Result<_>>()?),
        })
    }
}

/// The finder table of one model type.
pub struct Finders<M> {
    connection: Arc<dyn Connection>,
    model: ModelInfo,
    finders: HashMap<String, Arc<CompiledFinder>>,
    slow_query_threshold: Option<Duration>,
    _marker: PhantomData<fn() -> M>,
}

impl<M> fmt::Debug for Finders<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.finders.keys().collect();
        names.sort();
        f.debug_struct("Finders")
            .field("table", &self.model.table_name)
            .field("finders", &names)
            .field("slow_query_threshold", &self.slow_query_threshold)
            .finish()
    }
}

impl<M: Model> Finders<M> {
    pub fn new(connection: impl Connection + 'static) -> Self {
        Self::with_connection(Arc::new(connection))
    }

    pub fn with_connection(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            model: ModelInfo::of::<M>(),
            finders: HashMap::new(),
            slow_query_threshold: None,
            _marker: PhantomData,
        }
    }

    /// Replaces the connection used by later calls. Compiled finders are kept.
    pub fn set_connection(&mut self, connection: Arc<dyn Connection>) {
        self.connection = connection;
    }

    pub fn connection(&self) -> Arc<dyn Connection> {
        self.connection.clone()
    }

    /// Overrides the threshold the connection carries.
    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = Some(threshold);
        self
    }

    /// Calls slower than this are logged on `rillfind::slow_query`. Taken
    /// from the connection unless overridden; 500ms when neither sets one.
    pub fn slow_query_threshold(&self) -> Duration {
        self.slow_query_threshold
            .or_else(|| self.connection.slow_query_threshold())
            .unwrap_or(DEFAULT_SLOW_QUERY_THRESHOLD)
    }

    /// Compiles and registers a finder. Redefining a name replaces the old
    /// finder; on error nothing is registered.
    pub fn define(
        &mut self,
        name: impl Into<String>,
        arity: Arity,
        options: OptionSet,
    ) -> Result<Arc<CompiledFinder>> {
        self.define_spec(FinderSpec::new(name, arity, options)?)
    }

    pub fn define_spec(&mut self, spec: FinderSpec) -> Result<Arc<CompiledFinder>> {
        let compiled = Arc::new(CompiledFinder::compile(
            spec,
            &self.model,
            self.connection.as_ref(),
        )?);
        debug!(
            table = %self.model.table_name,
            finder = %compiled.name(),
            arity = %compiled.arity(),
            params = ?compiled.parameter_order().names(),
            positional = compiled.is_positional(),
            "finder defined"
        );
        if self
            .finders
            .insert(compiled.name().to_string(), compiled.clone())
            .is_some()
        {
            debug!(finder = %compiled.name(), "finder redefined, previous definition replaced");
        }
        metrics::record_finder_defined();
        Ok(compiled)
    }

    pub fn get(&self, name: &str) -> Option<Arc<CompiledFinder>> {
        self.finders.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.finders.keys().map(String::as_str)
    }

    fn lookup(&self, name: &str) -> Result<&CompiledFinder> {
        self.finders
            .get(name)
            .map(Arc::as_ref)
            .ok_or_else(|| Error::UnknownFinder(name.to_string()))
    }

    /// The SQL a call with `args` would run, without running it.
    pub fn sql(&self, name: &str, args: &Args) -> Result<String> {
        self.lookup(name)?.render(args, self.connection.as_ref())
    }

    #[instrument(skip_all, fields(table = %self.model.table_name, finder = %name))]
    pub async fn call(&self, name: &str, args: Args) -> Result<Found<M>> {
        let finder = self.lookup(name).inspect_err(|_| metrics::record_finder_failure())?;
        let connection = self.connection.clone();
        let rows = finder
            .fetch(&args, connection.as_ref(), self.slow_query_threshold())
            .await?;
        rows.try_map(M::from_row)
            .inspect_err(|_| metrics::record_finder_failure())
    }

    /// Calls a finder and keeps the first row.
    pub async fn first(&self, name: &str, args: Args) -> Result<Option<M>> {
        Ok(self.call(name, args).await?.into_one())
    }

    /// Calls a finder and keeps every row.
    pub async fn all(&self, name: &str, args: Args) -> Result<Vec<M>> {
        Ok(self.call(name, args).await?.into_many())
    }
}
