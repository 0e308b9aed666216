// Public modules
pub mod config;
pub mod downloader;
pub mod error;
pub mod fetcher;
pub mod history;
pub mod message;
pub mod models;
pub mod notifier;
pub mod pipeline;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::{Config, HistoryBackend, MailMethod, SmtpSettings};
pub use downloader::{ImageArchive, ImageDownloader};
pub use error::{Error, Result};
pub use fetcher::{ComicSource, XkcdClient};
pub use history::{open_history, FileHistory, HistoryStore, SqliteHistory};
pub use message::{Attachment, Message};
pub use models::Comic;
pub use notifier::{Notifier, Notify};
pub use pipeline::{Pipeline, RunError, RunOutcome, Stage};
