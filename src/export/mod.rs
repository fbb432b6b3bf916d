//! Getting an itinerary out of the page: clipboard copy, platform share,
//! and paged PDF rendering.

pub mod chrome;
pub mod copy;
pub mod pdf;
pub mod share;

pub use chrome::ChromeRasterizer;
pub use copy::{Clipboard, CopyButton, CopyStatus, SystemClipboard};
pub use pdf::{PageImage, PageSize, PageTile, PagedDocument, PdfExporter, Rasterizer, paginate};
pub use share::{
    MailtoShareSheet, ShareAction, ShareError, ShareOutcome, ShareRequest, ShareSheet, mailto_link,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Clipboard unavailable: {0}")]
    Clipboard(String),

    #[error("The itinerary must be unlocked before it can be exported")]
    Locked,

    #[error("Image failed to load: {0}")]
    ImageLoad(String),

    #[error("Rendering failed: {0}")]
    Render(String),
}
