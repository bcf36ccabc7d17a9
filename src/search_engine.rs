use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::StatusCode;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::time::Duration;
use log::{debug, info};
use url::{form_urlencoded, Url};
use crate::config::{SearchConfig, SearchEngineKind};
use crate::delay_manager::{self, Sleeper, ThreadSleeper};
use crate::error::{Error, Result};
use crate::extractor::PageExtractor;

const CUSTOM_SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";
const DDG_HTML_URL: &str = "https://html.duckduckgo.com/html/";

/// Appended to every rate-limited query; the association lists are all from British Columbia.
const QUERY_SUFFIX: &str = "BC";

const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
];

/// Resolves an organization name to its most likely website.
pub trait SearchBackend {
    fn resolve(&self, name: &str) -> Result<String>;
}

impl<T: SearchBackend + ?Sized> SearchBackend for Box<T> {
    fn resolve(&self, name: &str) -> Result<String> {
        (**self).resolve(name)
    }
}

/// Picks the backend named in the config. The scrape backend borrows the page extractor.
pub fn build_backend<'a, E: PageExtractor + 'a>(
    config: &SearchConfig,
    extractor: E,
) -> Result<Box<dyn SearchBackend + 'a>> {
    let backend: Box<dyn SearchBackend + 'a> = match config.kind() {
        SearchEngineKind::Google => Box::new(CustomSearch::new(config)?),
        SearchEngineKind::Ddg => Box::new(RateLimitedSearch::new(DuckDuckGoHtml::new()?, ThreadSleeper)),
        SearchEngineKind::Scrape => Box::new(ScrapeSearch::new(extractor)),
    };
    info!("Search backend: {:?}", config.kind());
    Ok(backend)
}

fn build_client() -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-CA,en;q=0.9"));

    let client = Client::builder()
        .timeout(Duration::from_secs(30))
        .default_headers(headers)
        .cookie_store(true)
        .build()?;
    Ok(client)
}

fn random_user_agent() -> &'static str {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())]
}

// --- Keyed API ---

#[derive(Debug, Deserialize)]
pub struct CustomSearchResponse {
    #[serde(default)]
    pub items: Vec<CustomSearchItem>,
}

#[derive(Debug, Deserialize)]
pub struct CustomSearchItem {
    pub link: String,
}

impl CustomSearchResponse {
    pub fn first_link(self, query: &str) -> Result<String> {
        self.items
            .into_iter()
            .next()
            .map(|item| item.link)
            .ok_or_else(|| Error::NoResults(query.to_string()))
    }
}

/// Google Custom Search JSON API.
pub struct CustomSearch {
    client: Client,
    endpoint: String,
    api_key: String,
    engine_id: String,
    extra_params: Vec<(String, String)>,
}

impl CustomSearch {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let (api_key, engine_id) = config.credentials()?;
        Ok(CustomSearch {
            client: build_client()?,
            endpoint: CUSTOM_SEARCH_URL.to_string(),
            api_key: api_key.to_string(),
            engine_id: engine_id.to_string(),
            extra_params: config.extra_params.clone(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn search(&self, query: &str) -> Result<CustomSearchResponse> {
        let mut params: Vec<(&str, &str)> = vec![
            ("q", query),
            ("key", self.api_key.as_str()),
            ("cx", self.engine_id.as_str()),
        ];
        params.extend(self.extra_params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        debug!("Custom search for '{}'", query);
        let resp = self.client.get(&self.endpoint).query(&params).send()?.error_for_status()?;
        Ok(resp.json::<CustomSearchResponse>()?)
    }
}

impl SearchBackend for CustomSearch {
    fn resolve(&self, name: &str) -> Result<String> {
        self.search(name)?.first_link(name)
    }
}

// --- Rate-limited public search ---

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub href: String,
}

/// A plain text web search. Rate limiting must surface as `Error::RateLimited`.
pub trait TextSearch {
    fn text(&self, query: &str) -> Result<Vec<SearchHit>>;
}

/// DuckDuckGo's no-JS HTML endpoint.
pub struct DuckDuckGoHtml {
    client: Client,
    region: String,
    safesearch: String,
}

impl DuckDuckGoHtml {
    pub fn new() -> Result<Self> {
        Ok(DuckDuckGoHtml {
            client: build_client()?,
            region: "ca-en".to_string(),
            // -2 is "off"
            safesearch: "-2".to_string(),
        })
    }
}

impl TextSearch for DuckDuckGoHtml {
    fn text(&self, query: &str) -> Result<Vec<SearchHit>> {
        let resp = self.client
            .get(DDG_HTML_URL)
            .header(USER_AGENT, random_user_agent())
            .query(&[("q", query), ("kl", self.region.as_str()), ("kp", self.safesearch.as_str())])
            .send()?;

        let status = resp.status();
        if matches!(status, StatusCode::ACCEPTED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS) {
            return Err(Error::RateLimited(format!("{} for '{}'", status, query)));
        }
        if !status.is_success() {
            return Err(Error::Search(format!("DuckDuckGo returned {} for '{}'", status, query)));
        }

        let body = resp.text()?;
        if is_anomaly_page(&body) {
            return Err(Error::RateLimited(format!("anomaly page for '{}'", query)));
        }
        parse_duckduckgo_results(&body)
    }
}

fn is_anomaly_page(html: &str) -> bool {
    html.contains("anomaly-modal") || html.contains("bots use DuckDuckGo too")
}

pub fn parse_duckduckgo_results(html: &str) -> Result<Vec<SearchHit>> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a.result__a")
        .map_err(|e| Error::Search(format!("invalid result selector: {:?}", e)))?;

    let hits = document
        .select(&selector)
        .filter_map(|element| {
            let href = element.value().attr("href")?;
            let target = result_target(href)?;
            Some(SearchHit {
                title: element.text().collect::<String>().trim().to_string(),
                href: target,
            })
        })
        .collect();
    Ok(hits)
}

/// Unwraps DuckDuckGo's `/l/?uddg=` redirect links and drops its own (ad) links.
fn result_target(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") { format!("https:{}", href) } else { href.to_string() };
    let url = Url::parse(&absolute).ok()?;

    let is_ddg = url.host_str().map_or(false, |h| h.ends_with("duckduckgo.com"));
    if is_ddg {
        if url.path() != "/l/" {
            return None;
        }
        return url
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned())
            .filter(|target| target.starts_with("http"));
    }

    matches!(url.scheme(), "http" | "https").then(|| absolute)
}

/// Wraps a `TextSearch` with the `5 * 2^attempt` second backoff on rate limits.
pub struct RateLimitedSearch<T, S = ThreadSleeper> {
    search: T,
    sleeper: S,
    max_retries: u32,
}

impl<T: TextSearch, S: Sleeper> RateLimitedSearch<T, S> {
    pub fn new(search: T, sleeper: S) -> Self {
        RateLimitedSearch {
            search,
            sleeper,
            max_retries: delay_manager::MAX_RETRIES,
        }
    }

    pub fn first_href(&self, query: &str) -> Result<String> {
        for attempt in 0..self.max_retries {
            match self.search.text(query) {
                Ok(hits) => {
                    return hits
                        .into_iter()
                        .next()
                        .map(|hit| hit.href)
                        .ok_or_else(|| Error::NoResults(query.to_string()));
                }
                Err(e) if e.is_rate_limited() => {
                    if attempt + 1 < self.max_retries {
                        self.sleeper.sleep(delay_manager::backoff_delay(attempt));
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::RetriesExhausted {
            query: query.to_string(),
            attempts: self.max_retries,
        })
    }
}

impl<T: TextSearch, S: Sleeper> SearchBackend for RateLimitedSearch<T, S> {
    fn resolve(&self, name: &str) -> Result<String> {
        self.first_href(&format!("{} {}", name, QUERY_SUFFIX))
    }
}

// --- Scrape-based search ---

/// Lets the LLM scraper read a DuckDuckGo results page and pick the link.
pub struct ScrapeSearch<E> {
    extractor: E,
}

impl<E: PageExtractor> ScrapeSearch<E> {
    pub fn new(extractor: E) -> Self {
        ScrapeSearch { extractor }
    }
}

pub fn duckduckgo_web_url(name: &str) -> String {
    let query: String = form_urlencoded::byte_serialize(name.as_bytes()).collect();
    format!("https://duckduckgo.com/?t=h_&q={}&ia=web", query)
}

impl<E: PageExtractor> SearchBackend for ScrapeSearch<E> {
    fn resolve(&self, name: &str) -> Result<String> {
        let source = duckduckgo_web_url(name);
        let prompt = format!("find the link of {}", name);
        let result = self.extractor.extract(&prompt, &source)?;
        Ok(result.require_str("link")?.to_string())
    }
}
