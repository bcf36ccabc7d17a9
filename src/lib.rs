pub mod config;
pub mod delay_manager;
pub mod error;
pub mod extractor;
pub mod link_cache;
pub mod logger;
pub mod pipeline;
pub mod records;
pub mod search_engine;

#[cfg(test)]
mod testing;

// Exporting types for convenience
pub use config::{CollectConfig, DiscoverConfig, ExtractorConfig, SearchConfig, SearchEngineKind};
pub use error::{Error, Result};
pub use extractor::{ExtractionResult, PageExtractor, SubprocessExtractor};
pub use link_cache::LinkCache;
pub use pipeline::{find_websites, get_np_info, CollectedInfo, Discovery, SkippedOrganization};
pub use records::{OrganizationRecord, OrganizationTable};
pub use search_engine::{build_backend, SearchBackend};
