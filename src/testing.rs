//! Fakes for the extractor, search and sleep seams, so pipeline tests never
//! spawn a scraper, hit the network or actually wait.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::delay_manager::Sleeper;
use crate::error::{Error, Result};
use crate::extractor::{ExtractionResult, PageExtractor, RawExtraction};
use crate::search_engine::{SearchBackend, SearchHit, TextSearch};

/// Answers extraction calls from canned stdout/stderr pairs keyed by source URL.
#[derive(Default)]
pub struct FakeExtractor {
    responses: HashMap<String, RawExtraction>,
    calls: RefCell<Vec<(String, String)>>,
}

impl FakeExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_json(mut self, source: &str, json: &str) -> Self {
        self.responses.insert(
            source.to_string(),
            RawExtraction { stdout: json.to_string(), stderr: String::new() },
        );
        self
    }

    /// Empty stdout, diagnostic on stderr.
    pub fn with_stderr(mut self, source: &str, stderr: &str) -> Self {
        self.responses.insert(
            source.to_string(),
            RawExtraction { stdout: String::new(), stderr: stderr.to_string() },
        );
        self
    }

    /// `(prompt, source)` for every call, in order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.borrow().clone()
    }
}

impl PageExtractor for FakeExtractor {
    fn extract(&self, prompt: &str, source: &str) -> Result<ExtractionResult> {
        self.calls.borrow_mut().push((prompt.to_string(), source.to_string()));
        match self.responses.get(source) {
            Some(raw) => raw.clone().into_result(),
            None => Err(Error::NoData { diagnostic: format!("no scripted response for {}", source) }),
        }
    }
}

type Scripted = Result<Vec<SearchHit>>;

/// Replays a fixed sequence of search outcomes, then falls back to `always` if set.
pub struct ScriptedSearch {
    script: RefCell<VecDeque<Scripted>>,
    fallback: Option<Box<dyn Fn() -> Scripted>>,
    queries: RefCell<Vec<String>>,
}

impl ScriptedSearch {
    pub fn new(script: Vec<Scripted>) -> Self {
        ScriptedSearch {
            script: RefCell::new(script.into()),
            fallback: None,
            queries: RefCell::new(Vec::new()),
        }
    }

    pub fn always(outcome: impl Fn() -> Scripted + 'static) -> Self {
        ScriptedSearch {
            script: RefCell::new(VecDeque::new()),
            fallback: Some(Box::new(outcome)),
            queries: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.queries.borrow().len()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.borrow().clone()
    }
}

impl TextSearch for ScriptedSearch {
    fn text(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.queries.borrow_mut().push(query.to_string());
        if let Some(next) = self.script.borrow_mut().pop_front() {
            return next;
        }
        match &self.fallback {
            Some(outcome) => outcome(),
            None => Err(Error::Search("search script exhausted".to_string())),
        }
    }
}

/// Resolves names from a fixed table; unknown names are `NoResults`.
#[derive(Default)]
pub struct StaticSearch {
    links: HashMap<String, String>,
    resolved: RefCell<Vec<String>>,
}

impl StaticSearch {
    pub fn with(mut self, name: &str, link: &str) -> Self {
        self.links.insert(name.to_string(), link.to_string());
        self
    }

    /// Every name passed to `resolve`, in order.
    pub fn resolved(&self) -> Vec<String> {
        self.resolved.borrow().clone()
    }
}

impl SearchBackend for StaticSearch {
    fn resolve(&self, name: &str) -> Result<String> {
        self.resolved.borrow_mut().push(name.to_string());
        self.links
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NoResults(name.to_string()))
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    delays: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays_secs(&self) -> Vec<u64> {
        self.delays.borrow().iter().map(Duration::as_secs).collect()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, delay: Duration) {
        self.delays.borrow_mut().push(delay);
    }
}
