pub mod catalog;
pub mod client;
pub mod config;
pub mod credential;
pub mod credential_cache;
pub mod discover;
pub mod error;
pub mod message;
pub mod report;
pub mod retry;
pub mod state;
pub mod streams;
pub mod sync;
pub mod transform;
pub mod types;

pub use catalog::Catalog;
pub use client::{AppStoreClient, ReportSource};
pub use config::TapConfig;
pub use discover::discover;
pub use error::{ConfigError, TapError};
pub use message::{Message, MessageWriter};
pub use state::State;
pub use sync::{SyncSettings, sync};
pub use types::{ReportOutcome, ReportRequest};
