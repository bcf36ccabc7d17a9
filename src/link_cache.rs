use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use indexmap::IndexMap;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};

/// Suffix appended to cached homepages to reach the page the info prompt reads.
pub const ABOUT_SUFFIX: &str = "/about";

#[derive(Debug, Deserialize, Clone)]
pub struct LinkRecord {
    #[serde(rename = "name", alias = "Name", alias = "association", alias = "Association")]
    pub name: String,
    #[serde(rename = "link", alias = "Link", alias = "url", alias = "URL", alias = "website")]
    pub link: String,
}

/// Ordered name -> homepage mapping. Order is the order names were discovered in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkCache {
    links: IndexMap<String, String>,
}

impl LinkCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(links: IndexMap<String, String>) -> Self {
        LinkCache { links }
    }

    /// Loads a JSON object cache, or a `name,link` CSV when the extension says so.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(Error::Config(format!("Link cache {:?} does not exist", path_ref)));
        }

        let is_csv = path_ref.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("csv"));
        let cache = if is_csv { load_csv(path_ref)? } else { load_json(path_ref)? };

        info!("Loaded {} cached links from {:?}", cache.len(), path_ref);
        Ok(cache)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        info!("Link cache saved to {:?}", path.as_ref());
        Ok(())
    }

    /// Keeps the first link seen for a name.
    pub fn insert(&mut self, name: String, link: String) {
        if self.links.contains_key(&name) {
            warn!("Duplicate association '{}' ignored", name);
            return;
        }
        self.links.insert(name, link);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.links.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// First `n` names in cache order.
    pub fn first_names(&self, n: usize) -> Vec<String> {
        self.links.keys().take(n).cloned().collect()
    }

    /// Extraction sources for `names`: each cached homepage with `/about` appended.
    pub fn about_links(&self, names: &[String]) -> Result<Vec<String>> {
        names
            .iter()
            .map(|name| {
                self.get(name)
                    .map(about_link)
                    .ok_or_else(|| Error::Config(format!("No cached link for '{}'", name)))
            })
            .collect()
    }
}

pub fn about_link(link: &str) -> String {
    format!("{}{}", link, ABOUT_SUFFIX)
}

/// Drops the last path segment: `http://example.org/team/about` -> `http://example.org/team`.
pub fn strip_last_segment(link: &str) -> &str {
    match link.rfind('/') {
        Some(idx) => &link[..idx],
        None => link,
    }
}

fn load_json(path: &Path) -> Result<LinkCache> {
    let file = File::open(path)?;
    let cache: LinkCache = serde_json::from_reader(BufReader::new(file))?;
    Ok(cache)
}

fn load_csv(path: &Path) -> Result<LinkCache> {
    let file = File::open(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut cache = LinkCache::new();
    for result in rdr.deserialize() {
        let record: LinkRecord = result?;
        if record.name.is_empty() {
            continue;
        }
        cache.insert(record.name, record.link);
    }
    Ok(cache)
}
