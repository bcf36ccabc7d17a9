use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde_json::Value;
use crate::config::CollectConfig;
use crate::error::{Error, Result};
use crate::extractor::{ExtractionResult, PageExtractor};
use crate::link_cache::{strip_last_segment, LinkCache};
use crate::records::OrganizationTable;
use crate::search_engine::SearchBackend;

/// Prompt sent to the scraper for every organization page.
pub const INFO_PROMPT: &str = "find these infos about the no-profit organization: \
    name, location, type, description, size, contacts, linkedin. \
    For linkedin, give the link; \
    for type, select the field where the no-profit operates, e.g. health, environment, etc. \
    Keep it to one, max two words.";

pub fn discovery_prompt(source: &str) -> String {
    format!("find the names of all the associations listed in the website {}", source)
}

/// Names listed on a directory page and the website found for each.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub names: Vec<String>,
    pub links: LinkCache,
}

/// An organization left out of the table because its scraper run printed nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedOrganization {
    /// 1-based position in the run.
    pub index: usize,
    pub limit: usize,
    pub name: String,
    pub diagnostic: String,
}

impl fmt::Display for SkippedOrganization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} | {}\n{}", self.index, self.limit, self.name, self.diagnostic)
    }
}

/// Extractions keyed by name, in scrape order, plus the organizations that were skipped.
#[derive(Debug, Clone, Default)]
pub struct CollectedInfo {
    pub infos: IndexMap<String, ExtractionResult>,
    pub skipped: Vec<SkippedOrganization>,
}

/// Reads the association names off `source`, then resolves each one with `search`, in order.
///
/// An extractor that prints nothing is reported as `Error::NoData` with its stderr.
/// A name listed twice is searched once and kept at its first position.
pub fn find_websites<E, B>(source: &str, extractor: &E, search: &B) -> Result<Discovery>
where
    E: PageExtractor + ?Sized,
    B: SearchBackend + ?Sized,
{
    let listing = extractor.extract(&discovery_prompt(source), source)?;
    let mut names = listed_names(&listing)?;
    let listed = names.len();
    let mut seen = HashSet::new();
    names.retain(|name| seen.insert(name.clone()));
    if names.len() < listed {
        warn!("{} duplicate association names at {} ignored", listed - names.len(), source);
    }
    info!("Found {} association names at {}", names.len(), source);

    let mut links = LinkCache::new();
    let total = names.len();
    for (i, name) in names.iter().enumerate() {
        info!("{}/{} | {}", i + 1, total, name);
        let link = search.resolve(name)?;
        debug!("{} -> {}", name, link);
        links.insert(name.clone(), link);
    }

    Ok(Discovery { names, links })
}

/// The list under the first key of the discovery output. Items may be plain strings or objects with a `name`.
fn listed_names(listing: &ExtractionResult) -> Result<Vec<String>> {
    let (key, value) = listing
        .first_value()
        .ok_or_else(|| Error::MalformedOutput("discovery output is an empty object".to_string()))?;

    let items = value.as_array().ok_or_else(|| {
        Error::MalformedOutput(format!("expected a list of names under '{}'", key))
    })?;

    items
        .iter()
        .map(|item| match item {
            Value::String(name) => Ok(name.trim().to_string()),
            Value::Object(obj) => obj
                .get("name")
                .and_then(Value::as_str)
                .map(|name| name.trim().to_string())
                .ok_or_else(|| Error::MissingField("name".to_string())),
            other => Err(Error::MalformedOutput(format!("unexpected name entry: {}", other))),
        })
        .filter(|name| !matches!(name, Ok(n) if n.is_empty()))
        .collect()
}

/// Scrapes the first `limit` organizations. `links[i]` is the page to read for `names[i]`.
///
/// Organizations whose scraper run printed nothing are logged, left out of `infos` and
/// reported in `skipped`. The stored
/// `name` is always the caller's, and `link` is the source with its last segment removed.
pub fn get_np_info<E>(
    limit: usize,
    links: &[String],
    names: &[String],
    extractor: &E,
) -> Result<CollectedInfo>
where
    E: PageExtractor + ?Sized,
{
    let count = limit.min(links.len()).min(names.len());
    if count < limit {
        warn!("Only {} organizations available, limit was {}", count, limit);
    }

    let mut collected = CollectedInfo::default();
    for (n, (source_link, name)) in links.iter().zip(names).take(count).enumerate() {
        match extractor.extract(INFO_PROMPT, source_link) {
            Ok(mut info) => {
                info.set("name", name.clone());
                info.set("link", strip_last_segment(source_link));
                collected.infos.insert(name.clone(), info);
            }
            Err(Error::NoData { diagnostic }) => {
                let skipped = SkippedOrganization {
                    index: n + 1,
                    limit,
                    name: name.clone(),
                    diagnostic,
                };
                warn!("{}", skipped);
                collected.skipped.push(skipped);
            }
            Err(e) => return Err(e),
        }
        debug!("{}/{} | done with {}", n + 1, limit, name);
    }

    info!("Collected info for {}/{} organizations", collected.infos.len(), count);
    Ok(collected)
}

/// One `collect` run: first `n` cached names, `/about` pages, scrape up to `limit`, save the CSV.
pub fn collect<E>(config: &CollectConfig, extractor: &E, at: NaiveDateTime) -> Result<(OrganizationTable, PathBuf)>
where
    E: PageExtractor + ?Sized,
{
    config.validate()?;

    let cache = LinkCache::load(config.cache_path())?;
    let names = cache.first_names(config.n_associations);
    if names.len() < config.n_associations {
        warn!("Link cache only has {} associations, {} requested", names.len(), config.n_associations);
    }
    let links = cache.about_links(&names)?;

    let collected = get_np_info(config.limit, &links, &names, extractor)?;
    let table = OrganizationTable::assemble(&collected.infos);
    let output = table.save(&config.data_dir, at)?;
    Ok((table, output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeExtractor, StaticSearch};
    use chrono::NaiveDate;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_caller_name_and_link_win() {
        let extractor = FakeExtractor::new().with_json(
            "http://example.org/team/about",
            r#"{"name": "X", "location": "Y", "link": "http://elsewhere.com", "contacts": ["a@x.org"]}"#,
        );
        let collected = get_np_info(
            1,
            &strings(&["http://example.org/team/about"]),
            &strings(&["Team Society"]),
            &extractor,
        )
        .unwrap();

        let info = &collected.infos["Team Society"];
        assert_eq!(info.require_str("name").unwrap(), "Team Society");
        assert_eq!(info.require_str("link").unwrap(), "http://example.org/team");
        assert_eq!(info.require_str("location").unwrap(), "Y");
        assert_eq!(extractor.calls()[0].0, INFO_PROMPT);
    }

    #[test]
    fn test_empty_output_skips_only_that_organization() {
        let extractor = FakeExtractor::new()
            .with_json("https://a.org/about", r#"{"name": "A"}"#)
            .with_stderr("https://b.org/about", "gemini: 429 quota exceeded")
            .with_json("https://c.org/about", r#"{"name": "C"}"#);

        let collected = get_np_info(
            3,
            &strings(&["https://a.org/about", "https://b.org/about", "https://c.org/about"]),
            &strings(&["A", "B", "C"]),
            &extractor,
        )
        .unwrap();

        assert_eq!(collected.infos.keys().collect::<Vec<_>>(), vec!["A", "C"]);
        assert_eq!(extractor.calls().len(), 3);

        assert_eq!(collected.skipped.len(), 1);
        let skipped = &collected.skipped[0];
        assert_eq!((skipped.index, skipped.name.as_str()), (2, "B"));
        let message = skipped.to_string();
        assert!(message.starts_with("2/3 | B\n"));
        assert!(message.contains("gemini: 429 quota exceeded"));
    }

    #[test]
    fn test_limit_bounds_calls() {
        let extractor = FakeExtractor::new()
            .with_json("https://a.org/about", "{}")
            .with_json("https://b.org/about", "{}");

        let collected = get_np_info(
            1,
            &strings(&["https://a.org/about", "https://b.org/about"]),
            &strings(&["A", "B"]),
            &extractor,
        )
        .unwrap();

        assert_eq!(collected.infos.len(), 1);
        assert!(collected.skipped.is_empty());
        assert_eq!(extractor.calls().len(), 1);
    }

    #[test]
    fn test_malformed_output_aborts() {
        let extractor = FakeExtractor::new().with_json("https://a.org/about", "Sorry, I could not");
        let result = get_np_info(1, &strings(&["https://a.org/about"]), &strings(&["A"]), &extractor);
        assert!(matches!(result, Err(Error::Json(_))));
    }

    #[test]
    fn test_find_websites_resolves_in_order() {
        let source = "https://bc-nonprofits.example/members";
        let extractor = FakeExtractor::new().with_json(
            source,
            r#"{"association_names": ["Food Bank", " Shelter Society ", ""]}"#,
        );
        let search = StaticSearch::default()
            .with("Food Bank", "https://foodbank.ca")
            .with("Shelter Society", "https://shelter.ca");

        let discovery = find_websites(source, &extractor, &search).unwrap();

        assert_eq!(discovery.names, vec!["Food Bank", "Shelter Society"]);
        assert_eq!(discovery.links.first_names(5), vec!["Food Bank", "Shelter Society"]);
        assert_eq!(discovery.links.get("Shelter Society"), Some("https://shelter.ca"));
        assert_eq!(extractor.calls()[0].0, discovery_prompt(source));
    }

    #[test]
    fn test_find_websites_duplicate_names_resolved_once() {
        let source = "https://bc-nonprofits.example/members";
        let extractor = FakeExtractor::new().with_json(
            source,
            r#"{"names": ["Food Bank", "Shelter Society", "Food Bank"]}"#,
        );
        let search = StaticSearch::default()
            .with("Food Bank", "https://foodbank.ca")
            .with("Shelter Society", "https://shelter.ca");

        let discovery = find_websites(source, &extractor, &search).unwrap();

        assert_eq!(discovery.names, vec!["Food Bank", "Shelter Society"]);
        assert_eq!(discovery.links.first_names(5), discovery.names);
        assert_eq!(discovery.links.get("Food Bank"), Some("https://foodbank.ca"));
        assert_eq!(search.resolved(), vec!["Food Bank", "Shelter Society"]);
    }

    #[test]
    fn test_find_websites_no_output_is_no_data() {
        let source = "https://bc-nonprofits.example/members";
        let extractor = FakeExtractor::new().with_stderr(source, "playwright: browser not installed");

        let err = find_websites(source, &extractor, &StaticSearch::default()).unwrap_err();
        assert!(err.is_no_data());
        assert!(err.to_string().contains("browser not installed"));
    }

    #[test]
    fn test_find_websites_search_failure_propagates() {
        let source = "https://bc-nonprofits.example/members";
        let extractor = FakeExtractor::new().with_json(source, r#"{"names": [{"name": "Unknown Org"}]}"#);

        let err = find_websites(source, &extractor, &StaticSearch::default()).unwrap_err();
        assert!(matches!(err, Error::NoResults(_)));
    }

    #[test]
    fn test_find_websites_rejects_non_list() {
        let source = "https://bc-nonprofits.example/members";
        let extractor = FakeExtractor::new().with_json(source, r#"{"names": "Food Bank"}"#);

        let err = find_websites(source, &extractor, &StaticSearch::default()).unwrap_err();
        assert!(matches!(err, Error::MalformedOutput(_)));
    }

    #[test]
    fn test_collect_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = LinkCache::new();
        cache.insert("Team Society".to_string(), "http://example.org/team".to_string());
        cache.insert("Broken Org".to_string(), "http://broken.org".to_string());
        cache.insert("Garden Club".to_string(), "http://garden.org".to_string());
        cache.insert("Not Scraped".to_string(), "http://later.org".to_string());
        cache.save(dir.path().join("links.json")).unwrap();

        let extractor = FakeExtractor::new()
            .with_json(
                "http://example.org/team/about",
                r#"{"name": "X", "location": "Y", "contacts": ["a@x.org", "555-1234"]}"#,
            )
            .with_stderr("http://broken.org/about", "timeout")
            .with_json("http://garden.org/about", r#"{"location": "Victoria, BC"}"#);

        let config = CollectConfig {
            n_associations: 4,
            limit: 3,
            source_link: "https://bc-nonprofits.example/members".to_string(),
            data_dir: dir.path().to_path_buf(),
            cache_path: None,
            verbose: false,
        };
        let at = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(13, 45, 0).unwrap();
        let (table, path) = collect(&config, &extractor, at).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(path, dir.path().join("associations_240102-1345.csv"));
        assert_eq!(extractor.calls().len(), 3);

        let reread = OrganizationTable::read_csv(&path).unwrap();
        assert_eq!(reread, table);
        let first = &reread.records()[0];
        assert_eq!(first.name, "Team Society");
        assert_eq!(first.link, "http://example.org/team");
        assert_eq!(first.contacts, "a@x.org, 555-1234");
        assert_eq!(reread.records()[1].name, "Garden Club");
    }
}
