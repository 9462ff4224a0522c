pub mod fetcher;
pub mod normalize;
pub mod parser;
pub mod search;
pub mod traits;
pub mod types;

pub use fetcher::{FetchError, FetchPolicy, HttpFetcher};
pub use parser::{EmbeddedJsonStrategy, Extraction, ListingExtractor};
pub use search::build_search_targets;
pub use traits::{ExtractContext, ExtractStrategy, Fetcher, Payload};
pub use types::{SearchParams, SearchTarget, TargetKind};
