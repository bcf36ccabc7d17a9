use std::process::Command;
use log::{debug, warn};
use serde_json::{Map, Value};
use crate::config::ExtractorConfig;
use crate::error::{Error, Result};

/// Field map returned by the LLM scraper. Nothing about its shape is guaranteed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionResult {
    fields: Map<String, Value>,
}

impl ExtractionResult {
    pub fn new(fields: Map<String, Value>) -> Self {
        ExtractionResult { fields }
    }

    /// Parses scraper stdout. The payload has to be a JSON object.
    pub fn from_json(text: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(fields) => Ok(ExtractionResult { fields }),
            other => Err(Error::MalformedOutput(format!(
                "expected a JSON object, got: {}",
                truncate(&other.to_string(), 120)
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String value of `key`, failing if it is absent or not a string.
    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MissingField(key.to_string()))
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    /// First entry in the map, whatever its key. The discovery prompt lets the LLM pick the key name.
    pub fn first_value(&self) -> Option<(&String, &Value)> {
        self.fields.iter().next()
    }
}

/// The LLM-driven scraping capability: a prompt and a source URL in, a field map out.
pub trait PageExtractor {
    fn extract(&self, prompt: &str, source: &str) -> Result<ExtractionResult>;
}

impl<T: PageExtractor + ?Sized> PageExtractor for &T {
    fn extract(&self, prompt: &str, source: &str) -> Result<ExtractionResult> {
        (**self).extract(prompt, source)
    }
}

impl<T: PageExtractor + ?Sized> PageExtractor for Box<T> {
    fn extract(&self, prompt: &str, source: &str) -> Result<ExtractionResult> {
        (**self).extract(prompt, source)
    }
}

/// Captured streams of one scraper invocation.
#[derive(Debug, Clone, Default)]
pub struct RawExtraction {
    pub stdout: String,
    pub stderr: String,
}

impl RawExtraction {
    /// Empty stdout means failure; stderr is the only diagnostic and JSON is never parsed.
    pub fn into_result(self) -> Result<ExtractionResult> {
        if self.stdout.trim().is_empty() {
            return Err(Error::NoData { diagnostic: self.stderr.trim().to_string() });
        }
        ExtractionResult::from_json(&self.stdout)
    }
}

/// Runs the external scraper as `<program> [script] -prompt <prompt> -source <source>`.
pub struct SubprocessExtractor {
    program: String,
    script: Option<String>,
}

impl SubprocessExtractor {
    pub fn new(config: &ExtractorConfig) -> Self {
        SubprocessExtractor {
            program: config.program.clone(),
            script: config.script.clone(),
        }
    }

    pub fn run(&self, prompt: &str, source: &str) -> Result<RawExtraction> {
        let mut cmd = Command::new(&self.program);
        if let Some(script) = &self.script {
            cmd.arg(script);
        }
        cmd.arg("-prompt").arg(prompt).arg("-source").arg(source);

        debug!("Running extractor {} on {}", self.program, source);
        let output = cmd.output()?;

        if !output.status.success() {
            warn!("Extractor exited with {} for {}", output.status, source);
        }

        Ok(RawExtraction {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

impl PageExtractor for SubprocessExtractor {
    fn extract(&self, prompt: &str, source: &str) -> Result<ExtractionResult> {
        self.run(prompt, source)?.into_result()
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
