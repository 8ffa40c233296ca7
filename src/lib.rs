//! Rillfind: declarative, precompiled SQL finders for Postgres-backed models.

pub mod assemble;
pub mod backend;
pub mod config;
mod error;
pub mod finder;
pub mod metrics;
pub mod pg;
pub mod placeholder;
pub mod spec;
pub mod testing;

pub use backend::{Connection, Inheritance, Model, Prefetch, SingleTableInheritance};
pub use config::BackendConfig;
pub use error::{Error, Result, WithContext};
pub use finder::{Args, CompiledFinder, Finders, Found};
pub use pg::PgBackend;
pub use spec::{Arity, FinderSpec, OptionSet};

pub mod prelude {
    pub use crate::{Args, Arity, Finders, Model, OptionSet, Result};
}
