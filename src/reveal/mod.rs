//! Display pipeline: provider markup to HTML, then HTML to a visible
//! prefix and a locked suffix.

pub mod formatter;
pub mod splitter;

pub use formatter::format_itinerary;
pub use splitter::{RevealFraction, RevealFractionError, SplitHtml, split_html, visible_text_len};

use serde::{Deserialize, Serialize};

/// Visible and locked halves of one itinerary, plus the unlock flag.
///
/// `unlocked` only ever moves from false to true; see
/// [`crate::unlock::UnlockController`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealState {
    pub visible_html: String,
    pub locked_html: String,
    pub unlocked: bool,
}

impl RevealState {
    /// Format raw provider text and split it for display
    pub fn from_raw_text(raw_text: &str, fraction: RevealFraction) -> Self {
        let html = format_itinerary(raw_text);
        Self::from_split(split_html(&html, fraction))
    }

    pub fn from_split(split: SplitHtml) -> Self {
        Self {
            visible_html: split.visible,
            locked_html: split.locked,
            unlocked: false,
        }
    }

    /// Whether there is anything behind the paywall at all
    pub fn requires_unlock(&self) -> bool {
        !self.locked_html.is_empty()
    }

    /// The complete HTML, regardless of lock state
    pub fn full_html(&self) -> String {
        format!("{}{}", self.visible_html, self.locked_html)
    }

    pub(crate) fn mark_unlocked(&mut self) {
        self.unlocked = true;
    }
}
