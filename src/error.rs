use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid finder definition `{finder}`: {reason}")]
    Definition { finder: String, reason: String },
    #[error("argument mismatch calling `{finder}`: {detail}")]
    ArgumentMismatch { finder: String, detail: String },
    #[error("unknown finder: {0}")]
    UnknownFinder(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn definition(finder: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Definition {
            finder: finder.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn mismatch(finder: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ArgumentMismatch {
            finder: finder.into(),
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub trait WithContext<T> {
    fn context(self, msg: impl Into<String>) -> Result<T>;
}

impl<T> WithContext<T> for Result<T> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Context {
            context: msg.into(),
            source: Box::new(e),
        })
    }
}
