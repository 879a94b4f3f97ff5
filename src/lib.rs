pub mod config;
pub mod errors;
pub mod routes;
pub mod upload;

pub use config::AppConfig;
pub use errors::{ApiError, ConfigError, UploadError};
pub use routes::app;
pub use upload::{
    Category, DocumentStore, LocalUploadStore, RuleSet, StoredFileReference, UploadRequest,
    ValidationRule, normalize_prefix,
};
