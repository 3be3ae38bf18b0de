//! Track value supplied by the station catalog

use std::fmt;

use serde::{Deserialize, Serialize};

/// One playable stream with its display metadata.
///
/// Identity is the URL: two tracks with the same URL are the same request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    url: String,
    label: String,
    #[serde(default)]
    tags: Vec<String>,
}

impl Track {
    pub fn new(url: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            label: label.into(),
            tags: Vec::new(),
        }
    }

    /// Builder-style tag list
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// True if the URL is empty or whitespace only
    pub fn is_blank(&self) -> bool {
        self.url.trim().is_empty()
    }

    /// Tags joined for display, e.g. "jazz · live"
    pub fn tag_line(&self) -> String {
        self.tags.join(" · ")
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for Track {}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.label.is_empty() {
            write!(f, "{}", self.url)
        } else {
            write!(f, "{} <{}>", self.label, self.url)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_url() {
        let a = Track::new("http://a/stream", "A");
        let b = Track::new("http://a/stream", "Renamed").with_tags(["jazz"]);
        let c = Track::new("http://c/stream", "A");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn blank_detection() {
        assert!(Track::new("", "x").is_blank());
        assert!(Track::new("   ", "x").is_blank());
        assert!(!Track::new("http://a", "x").is_blank());
    }

    #[test]
    fn tag_line_keeps_order() {
        let track = Track::new("u", "l").with_tags(["jazz", "live", "fr"]);
        assert_eq!(track.tags(), ["jazz", "live", "fr"]);
        assert_eq!(track.tag_line(), "jazz · live · fr");
    }

    #[test]
    fn display_falls_back_to_url() {
        assert_eq!(Track::new("http://a", "").to_string(), "http://a");
        assert_eq!(Track::new("http://a", "A").to_string(), "A <http://a>");
    }
}
