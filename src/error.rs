use thiserror::Error;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the library
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The extractor exited without writing anything to stdout.
    #[error("Extractor produced no data: {diagnostic}")]
    NoData { diagnostic: String },

    #[error("Malformed extractor output: {0}")]
    MalformedOutput(String),

    #[error("Missing field '{0}' in extractor output")]
    MissingField(String),

    #[error("No search results for '{0}'")]
    NoResults(String),

    #[error("Search rate limited: {0}")]
    RateLimited(String),

    #[error("Max retries reached after {attempts} attempts. Unable to complete search for '{query}'")]
    RetriesExhausted { query: String, attempts: u32 },

    #[error("Search failed: {0}")]
    Search(String),
}

impl Error {
    /// True when the extractor simply had nothing to say, as opposed to a hard failure.
    pub fn is_no_data(&self) -> bool {
        matches!(self, Error::NoData { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimited(_))
    }
}
