//! Error types for tiwut-store

use std::path::PathBuf;
use std::process::ExitStatus;

/// Store operation errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] Box<ureq::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Unknown app: {0}")]
    UnknownApp(String),

    #[error("'{0}' is not a valid app name")]
    InvalidAppName(String),

    #[error("Another installation is already running ({active})")]
    Busy { active: String },

    #[error("'{}' not found!", .0.display())]
    EntryPointMissing(PathBuf),

    #[error("Extraction failed: {0}")]
    Extraction(ExitStatus),

    #[error("Shortcuts are not supported on this platform")]
    ShortcutUnsupported,
}

impl From<ureq::Error> for StoreError {
    fn from(err: ureq::Error) -> Self {
        StoreError::Http(Box::new(err))
    }
}
