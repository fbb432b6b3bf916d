//! Partial reveal: split HTML at a visible-text character boundary.
//!
//! The split point is measured in characters a reader sees (text outside
//! `<...>`), never in raw HTML bytes, so a 30% reveal looks like 30% no
//! matter how dense the markup is. Tags are never cut in half.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Share of visible text shown before the paywall, strictly inside (0, 1)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct RevealFraction(f64);

#[derive(Debug, Error, PartialEq)]
#[error("Reveal fraction must be strictly between 0 and 1, got {0}")]
pub struct RevealFractionError(pub f64);

impl RevealFraction {
    pub fn new(value: f64) -> Result<Self, RevealFractionError> {
        if value.is_finite() && value > 0.0 && value < 1.0 {
            Ok(Self(value))
        } else {
            Err(RevealFractionError(value))
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for RevealFraction {
    type Error = RevealFractionError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RevealFraction> for f64 {
    fn from(fraction: RevealFraction) -> Self {
        fraction.0
    }
}

/// Result of a split. `visible + locked` is always the original HTML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitHtml {
    pub visible: String,
    pub locked: String,
}

impl SplitHtml {
    /// Nothing left to unlock: the paywall UI should be skipped
    pub fn is_fully_visible(&self) -> bool {
        self.locked.is_empty()
    }

    fn all_visible(html: &str) -> Self {
        Self {
            visible: html.to_string(),
            locked: String::new(),
        }
    }
}

/// Count characters outside tag markers.
///
/// Uses the same inside/outside state machine as [`split_html`] so both
/// agree on what "visible" means, including for malformed markup.
pub fn visible_text_len(html: &str) -> usize {
    let mut inside_tag = false;
    let mut count = 0;
    for c in html.chars() {
        if c == '<' {
            inside_tag = true;
        }
        if !inside_tag {
            count += 1;
        }
        if c == '>' {
            inside_tag = false;
        }
    }
    count
}

/// Split `html` so the visible part holds `floor(L * fraction)` text characters.
///
/// Empty input or input without text returns everything visible. When the
/// cut reaches the end of the text, everything is visible too.
pub fn split_html(html: &str, fraction: RevealFraction) -> SplitHtml {
    let total = visible_text_len(html);
    if total == 0 {
        return SplitHtml::all_visible(html);
    }

    let cut = (total as f64 * fraction.value()).floor() as usize;
    if cut >= total {
        return SplitHtml::all_visible(html);
    }

    let mut inside_tag = false;
    let mut count = 0;
    let mut boundary = 0;

    // cut == 0 leaves boundary at the very start
    if cut > 0 {
        for (index, c) in html.char_indices() {
            if c == '<' {
                inside_tag = true;
            }
            if !inside_tag {
                count += 1;
            }
            if c == '>' {
                inside_tag = false;
            }
            if count == cut {
                boundary = index + c.len_utf8();
                break;
            }
        }
    }

    let (visible, locked) = html.split_at(boundary);
    SplitHtml {
        visible: visible.to_string(),
        locked: locked.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fraction(value: f64) -> RevealFraction {
        RevealFraction::new(value).unwrap()
    }

    /// Every '<' on one side is closed by a '>' on the same side
    fn tags_balanced(side: &str) -> bool {
        let mut inside = false;
        for c in side.chars() {
            match c {
                '<' if inside => return false,
                '<' => inside = true,
                '>' => inside = false,
                _ => {}
            }
        }
        !inside
    }

    fn sample_documents() -> Vec<String> {
        vec![
            "plain text with no markup at all".to_string(),
            "<h1>Paris</h1><br /><ul><li>Louvre</li><li>Seine cruise</li></ul>".to_string(),
            "<p><strong>D</strong><em>a</em><strong>y</strong></p><p>1</p>".to_string(),
            "Déjà vu in <strong>Kraków</strong> — żurek & pierogi<br />🍲 dinner".to_string(),
            format!("<div>{}</div>", "<span>x</span>".repeat(40)),
            format!("{}<br />{}", "a".repeat(137), "b".repeat(59)),
        ]
    }

    #[test]
    fn test_reconstitution_across_fractions() {
        for doc in sample_documents() {
            for step in 1..100 {
                let split = split_html(&doc, fraction(step as f64 / 100.0));
                assert_eq!(
                    format!("{}{}", split.visible, split.locked),
                    doc,
                    "lost characters at fraction {}",
                    step
                );
            }
        }
    }

    #[test]
    fn test_tags_never_split() {
        for doc in sample_documents() {
            for step in 1..100 {
                let split = split_html(&doc, fraction(step as f64 / 100.0));
                assert!(tags_balanced(&split.visible), "visible: {}", split.visible);
                assert!(tags_balanced(&split.locked), "locked: {}", split.locked);
            }
        }
    }

    #[test]
    fn test_visible_length_is_proportional() {
        for doc in sample_documents() {
            let total = visible_text_len(&doc);
            for step in 1..100 {
                let f = step as f64 / 100.0;
                let split = split_html(&doc, fraction(f));
                let expected = (total as f64 * f).floor() as usize;
                if expected < total {
                    assert_eq!(visible_text_len(&split.visible), expected);
                } else {
                    assert!(split.locked.is_empty());
                }
            }
        }
    }

    #[test]
    fn test_markup_density_does_not_shift_cut() {
        let sparse = "abcdefghij";
        let dense = "<b>a</b><i>b</i><b>c</b><i>d</i><b>e</b><i>f</i><b>g</b><i>h</i><b>i</b><i>j</i>";

        let sparse_split = split_html(sparse, fraction(0.5));
        let dense_split = split_html(dense, fraction(0.5));

        assert_eq!(sparse_split.visible, "abcde");
        assert_eq!(visible_text_len(&dense_split.visible), 5);
        assert_eq!(dense_split.visible, "<b>a</b><i>b</i><b>c</b><i>d</i><b>e");
        assert_eq!(dense_split.locked, "</b><i>f</i><b>g</b><i>h</i><b>i</b><i>j</i>");
    }

    #[test]
    fn test_empty_input_is_all_visible() {
        let split = split_html("", fraction(0.3));
        assert_eq!(split.visible, "");
        assert_eq!(split.locked, "");
        assert!(split.is_fully_visible());
    }

    #[test]
    fn test_tags_only_input_is_all_visible() {
        let html = "<br /><hr />";
        let split = split_html(html, fraction(0.5));
        assert_eq!(split.visible, html);
        assert!(split.locked.is_empty());
    }

    #[test]
    fn test_extreme_fractions() {
        let html = "x".repeat(1000);
        let split = split_html(&html, fraction(0.9999));
        assert_eq!(visible_text_len(&split.visible), 999);

        // A single character rounds down to nothing visible
        let single = split_html("<p>a</p>", fraction(0.99));
        assert_eq!(single.visible, "");
        assert_eq!(single.locked, "<p>a</p>");
    }

    #[test]
    fn test_multibyte_characters_counted_once() {
        let html = "ééééé";
        let split = split_html(html, fraction(0.4));
        assert_eq!(split.visible, "éé");
        assert_eq!(split.locked, "ééé");
    }

    #[test]
    fn test_reveal_fraction_bounds() {
        assert!(RevealFraction::new(0.0).is_err());
        assert!(RevealFraction::new(1.0).is_err());
        assert!(RevealFraction::new(f64::NAN).is_err());
        assert!(RevealFraction::new(0.3).is_ok());
    }

    #[test]
    fn test_reveal_fraction_deserialize() {
        let f: RevealFraction = serde_json::from_str("0.25").unwrap();
        assert_eq!(f.value(), 0.25);
        assert!(serde_json::from_str::<RevealFraction>("1.5").is_err());
    }

    /// Itinerary-like markup: text runs (some multibyte) mixed with tags
    fn markup() -> impl Strategy<Value = String> {
        let piece = prop_oneof![
            "[a-zA-Z0-9 ,.&-]{1,12}",
            "[éżłß🍲]{1,3}",
            Just("<br />".to_string()),
            Just("<strong>".to_string()),
            Just("</strong>".to_string()),
            Just("<ul><li>".to_string()),
            Just("</li></ul>".to_string()),
            "<h[1-3]>",
        ];
        prop::collection::vec(piece, 0..40).prop_map(|pieces| pieces.concat())
    }

    proptest! {
        #[test]
        fn test_split_properties_hold_for_generated_markup(
            html in markup(),
            value in 0.001f64..0.999,
        ) {
            let f = fraction(value);
            let split = split_html(&html, f);

            prop_assert_eq!(format!("{}{}", split.visible, split.locked), html.clone());

            prop_assert!(tags_balanced(&split.visible), "visible: {}", split.visible);
            prop_assert!(tags_balanced(&split.locked), "locked: {}", split.locked);

            let total = visible_text_len(&html);
            let expected = (total as f64 * value).floor() as usize;
            if expected < total {
                prop_assert_eq!(visible_text_len(&split.visible), expected);
            } else {
                prop_assert!(split.locked.is_empty());
            }
        }
    }
}
