use nonprofit_scout_lib::{logger, pipeline, search_engine};
use nonprofit_scout_lib::{
    CollectConfig, DiscoverConfig, ExtractorConfig, SearchConfig, SearchEngineKind,
    SubprocessExtractor,
};

use anyhow::Context;
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use log::{debug, info};
use std::path::PathBuf;
use std::time::Instant;

/// Find nonprofit associations and scrape their details into a CSV database
#[derive(Parser, Debug)]
#[command(name = "nonprofit-scout")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape info for cached associations and write associations_<YYMMDD-HHMM>.csv
    Collect {
        /// Number of associations to take from the link cache
        #[arg(short = 'n', long = "n-associations")]
        n_associations: usize,

        /// How many of those to actually scrape (must be <= n)
        #[arg(short, long)]
        limit: usize,

        /// Directory page the associations were listed on (only used by `discover`)
        #[arg(short, long = "source-link")]
        source_link: String,

        /// Directory holding links.json and receiving the CSV
        #[arg(short, long, default_value = "../")]
        path: PathBuf,

        /// Read the link cache from this file instead of <path>/links.json (.json or .csv)
        #[arg(long)]
        cache: Option<PathBuf>,

        #[arg(short, long)]
        verbose: bool,

        #[command(flatten)]
        extractor: ExtractorArgs,
    },

    /// Read association names off a directory page, search their websites and save the link cache
    Discover {
        #[arg(short, long = "source-link")]
        source_link: String,

        /// Directory receiving links.json
        #[arg(short, long, default_value = "../")]
        path: PathBuf,

        #[arg(long, value_enum, default_value_t = SearchEngineKind::Ddg)]
        engine: SearchEngineKind,

        #[arg(short, long)]
        verbose: bool,

        #[command(flatten)]
        search: SearchArgs,

        #[command(flatten)]
        extractor: ExtractorArgs,
    },
}

#[derive(Args, Debug)]
struct ExtractorArgs {
    /// Program that runs the LLM scraper
    #[arg(long, env = "SCOUT_EXTRACTOR_PROGRAM", default_value = "python3")]
    extractor_program: String,

    /// Script passed to the program before -prompt/-source (empty for none)
    #[arg(long, env = "SCOUT_EXTRACTOR_SCRIPT", default_value = "scraper.py")]
    extractor_script: String,
}

impl From<ExtractorArgs> for ExtractorConfig {
    fn from(args: ExtractorArgs) -> Self {
        ExtractorConfig {
            program: args.extractor_program,
            script: Some(args.extractor_script).filter(|s| !s.trim().is_empty()),
        }
    }
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Google Custom Search API key
    #[arg(long, env = "SEARCH_API_KEY", hide_env_values = true)]
    search_api_key: Option<String>,

    /// Google Custom Search engine id (cx)
    #[arg(long, env = "SEARCH_ENGINE_ID")]
    search_engine_id: Option<String>,

    /// Extra key=value query parameters for the custom search API
    #[arg(long = "search-param", value_parser = parse_key_val)]
    search_params: Vec<(String, String)>,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    Ok((key.to_string(), value.to_string()))
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let verbose = match &cli.command {
        Command::Collect { verbose, .. } | Command::Discover { verbose, .. } => *verbose,
    };
    logger::init(verbose);

    match cli.command {
        Command::Collect { n_associations, limit, source_link, path, cache, verbose, extractor } => {
            let config = CollectConfig {
                n_associations,
                limit,
                source_link,
                data_dir: path,
                cache_path: cache,
                verbose,
            };
            run_collect(&config, &extractor.into())
        }
        Command::Discover { source_link, path, engine, verbose, search, extractor } => {
            let config = DiscoverConfig { source_link, data_dir: path, verbose };
            let search = SearchConfig {
                engine: Some(engine),
                api_key: search.search_api_key,
                engine_id: search.search_engine_id,
                extra_params: search.search_params,
            };
            run_discover(&config, &search, &extractor.into())
        }
    }
}

fn run_collect(config: &CollectConfig, extractor_config: &ExtractorConfig) -> anyhow::Result<()> {
    let start = Instant::now();
    debug!("Source link {} is not used when collecting", config.source_link);

    // 1. Initialize Extractor
    let extractor = SubprocessExtractor::new(extractor_config);

    // 2. Load Cache, Scrape and Save CSV
    let (table, output) = pipeline::collect(config, &extractor, Local::now().naive_local())
        .with_context(|| format!("Collect run failed (cache {:?})", config.cache_path()))?;

    // 3. Summary
    if config.verbose {
        info!("Time taken: {:.2?}", start.elapsed());
        for record in table.records() {
            info!("{} | {} | {}", record.name, record.location, record.link);
        }
    }
    info!("Done: {} rows written to {:?}", table.len(), output);
    Ok(())
}

fn run_discover(
    config: &DiscoverConfig,
    search: &SearchConfig,
    extractor_config: &ExtractorConfig,
) -> anyhow::Result<()> {
    let start = Instant::now();
    config.validate()?;

    // 1. Initialize Engines
    let extractor = SubprocessExtractor::new(extractor_config);
    let backend = search_engine::build_backend(search, &extractor)?;

    // 2. Read Names and Search Links
    let discovery = pipeline::find_websites(&config.source_link, &extractor, &backend)
        .with_context(|| format!("Discovery failed for {}", config.source_link))?;

    // 3. Save Link Cache
    let cache_path = config.cache_path();
    discovery.links.save(&cache_path)?;
    info!("Found links for {} associations", discovery.links.len());

    if config.verbose {
        info!("Time taken: {:.2?}", start.elapsed());
    }
    Ok(())
}
