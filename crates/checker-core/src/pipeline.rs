//! One checker run: fetch, check, download, notify, record.
//!
//! Stages run strictly in order and each one gates the next. History is only
//! written after the notification went out, so a crash between the two means
//! the comic is sent again on the next run rather than lost.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::downloader::ImageArchive;
use crate::error::Error;
use crate::fetcher::ComicSource;
use crate::history::HistoryStore;
use crate::notifier::Notify;

/// Run states. There is no aborted state: an abort is a [`RunError`]
/// carrying the stage that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Checking,
    Downloading,
    Notifying,
    Recording,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetching => "fetching",
            Stage::Checking => "checking",
            Stage::Downloading => "downloading",
            Stage::Notifying => "notifying",
            Stage::Recording => "recording",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// A run that stopped early, tagged with the stage it stopped in
#[derive(Error, Debug)]
#[error("{stage} stage failed: {source}")]
pub struct RunError {
    pub stage: Stage,
    #[source]
    pub source: Error,
}

impl RunError {
    fn at(stage: Stage) -> impl FnOnce(Error) -> RunError {
        move |source| {
            error!(stage = %stage, error = %source, "Aborting run");
            RunError { stage, source }
        }
    }
}

/// How a successful run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Latest comic was already delivered; nothing was sent or written.
    UpToDate { num: u32, last_seen: u32 },
    /// Latest comic was sent and recorded.
    Delivered {
        num: u32,
        previous: Option<u32>,
        image: Option<PathBuf>,
    },
}

pub struct Pipeline<S, H, N, A> {
    source: S,
    history: H,
    notifier: N,
    archive: Option<A>,
    recipient: String,
    attach_images: bool,
}

impl<S, H, N, A> Pipeline<S, H, N, A>
where
    S: ComicSource,
    H: HistoryStore,
    N: Notify,
    A: ImageArchive,
{
    /// `archive` is `None` when downloads are disabled.
    pub fn new(
        source: S,
        history: H,
        notifier: N,
        archive: Option<A>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            source,
            history,
            notifier,
            archive,
            recipient: recipient.into(),
            attach_images: false,
        }
    }

    /// Attach the archived image to the mail when the download succeeded.
    pub fn attach_images(mut self, attach: bool) -> Self {
        self.attach_images = attach;
        self
    }

    pub async fn run(&mut self) -> Result<RunOutcome, RunError> {
        debug!(stage = %Stage::Fetching, "Fetching latest comic");
        let comic = self
            .source
            .fetch_latest()
            .await
            .map_err(RunError::at(Stage::Fetching))?;

        debug!(stage = %Stage::Checking, num = comic.num, "Checking history");
        let previous = self
            .history
            .last_seen()
            .map_err(RunError::at(Stage::Checking))?;

        if let Some(last_seen) = previous {
            if comic.num <= last_seen {
                info!(
                    stage = %Stage::Done,
                    num = comic.num,
                    last_seen,
                    "xkcd {} already sent, nothing to do",
                    comic.num
                );
                return Ok(RunOutcome::UpToDate {
                    num: comic.num,
                    last_seen,
                });
            }
        }

        info!(num = comic.num, title = %comic.title, previous = ?previous, "New comic found");

        let image = match &self.archive {
            Some(archive) => {
                debug!(stage = %Stage::Downloading, num = comic.num, "Downloading image");
                match archive.save(&comic).await {
                    Ok(path) => Some(path),
                    Err(e) => {
                        // Archiving is best effort; the mail still goes out
                        warn!(stage = %Stage::Downloading, num = comic.num, error = %e, "Image download failed, continuing");
                        None
                    }
                }
            }
            None => {
                debug!(num = comic.num, "Downloads disabled, skipping");
                None
            }
        };

        let attachment = image.as_deref().filter(|_| self.attach_images);

        debug!(stage = %Stage::Notifying, num = comic.num, recipient = %self.recipient, "Sending notification");
        self.notifier
            .send(&comic, &self.recipient, attachment)
            .await
            .map_err(RunError::at(Stage::Notifying))?;

        debug!(stage = %Stage::Recording, num = comic.num, "Recording comic as sent");
        self.history.mark_seen(comic.num).map_err(|e| {
            warn!(num = comic.num, "Notification sent but history not updated; next run will send it again");
            RunError::at(Stage::Recording)(e)
        })?;

        info!(stage = %Stage::Done, num = comic.num, "Delivered xkcd {}", comic.num);

        Ok(RunOutcome::Delivered {
            num: comic.num,
            previous,
            image,
        })
    }
}
