pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod info;
pub mod logging;
pub mod provider;
pub mod service;

pub use cache::{CacheStore, ExpiringCache, SqliteStore};
pub use error::{MetadataError, Result};
pub use info::MovieInfo;
pub use provider::{MetadataProvider, RawRecord, REQUIRED_DETAIL_SETS};
pub use service::MetadataService;
