use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Name of the link cache file inside the data directory.
pub const LINK_CACHE_FILE: &str = "links.json";

/// Which backend resolves an organization name to a website.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SearchEngineKind {
    /// Google Custom Search JSON API (needs an API key and engine id)
    Google,
    /// DuckDuckGo HTML search with exponential backoff on rate limits
    Ddg,
    /// Ask the LLM scraper to read a DuckDuckGo results page
    Scrape,
}

/// Credentials and endpoint for the keyed search API.
#[derive(Debug, Clone, Default)]
pub struct SearchConfig {
    pub engine: Option<SearchEngineKind>,
    pub api_key: Option<String>,
    pub engine_id: Option<String>,
    /// Extra query parameters forwarded verbatim to the keyed API.
    pub extra_params: Vec<(String, String)>,
}

impl SearchConfig {
    pub fn kind(&self) -> SearchEngineKind {
        self.engine.unwrap_or(SearchEngineKind::Ddg)
    }

    /// Returns `(api_key, engine_id)` or a config error naming what is missing.
    pub fn credentials(&self) -> Result<(&str, &str)> {
        let key = self.api_key.as_deref().filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("SEARCH_API_KEY is required for the google engine".to_string()))?;
        let cx = self.engine_id.as_deref().filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::Config("SEARCH_ENGINE_ID is required for the google engine".to_string()))?;
        Ok((key, cx))
    }
}

/// How the external scraping tool is launched.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub program: String,
    pub script: Option<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            script: Some("scraper.py".to_string()),
        }
    }
}

/// Settings for one `collect` run.
#[derive(Debug, Clone)]
pub struct CollectConfig {
    pub n_associations: usize,
    pub limit: usize,
    pub source_link: String,
    pub data_dir: PathBuf,
    pub cache_path: Option<PathBuf>,
    pub verbose: bool,
}

impl CollectConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_associations == 0 {
            return Err(Error::Config("number of associations must be at least 1".to_string()));
        }
        if self.limit > self.n_associations {
            return Err(Error::Config(format!(
                "limit ({}) cannot exceed the number of associations ({})",
                self.limit, self.n_associations
            )));
        }
        validate_dir(&self.data_dir)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_path.clone().unwrap_or_else(|| self.data_dir.join(LINK_CACHE_FILE))
    }
}

/// Settings for one `discover` run.
#[derive(Debug, Clone)]
pub struct DiscoverConfig {
    pub source_link: String,
    pub data_dir: PathBuf,
    pub verbose: bool,
}

impl DiscoverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.source_link.trim().is_empty() {
            return Err(Error::Config("source link cannot be empty".to_string()));
        }
        validate_dir(&self.data_dir)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join(LINK_CACHE_FILE)
    }
}

fn validate_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Err(Error::Config(format!("Directory does not exist: {}", dir.display())));
    }
    if !dir.is_dir() {
        return Err(Error::Config(format!("Path is not a directory: {}", dir.display())));
    }
    Ok(())
}
