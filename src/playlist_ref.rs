use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// A validated 22-character catalog playlist id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaylistId(String);

// URI form: spotify:playlist:37i9dQZF1DXcBWIGoYBM5M
static URI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9]*:playlist:(?P<id>[A-Za-z0-9]{22})$").unwrap()
});

// URL form: https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M?si=abc
static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"playlist/(?P<id>[A-Za-z0-9]{22})").unwrap()
});

static BARE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]{22}$").unwrap()
});

impl PlaylistId {
    /// Extract the playlist id from a URL, a `scheme:playlist:id` URI, or a bare id.
    /// Returns None when the input matches none of the three forms.
    pub fn parse(input: &str) -> Option<Self> {
        let s = input.trim();
        if s.is_empty() {
            return None;
        }

        if let Some(caps) = URI_RE.captures(s) {
            return Some(Self(caps["id"].to_string()));
        }
        if let Some(caps) = URL_RE.captures(s) {
            return Some(Self(caps["id"].to_string()));
        }
        if BARE_ID_RE.is_match(s) {
            return Some(Self(s.to_string()));
        }
        None
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaylistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
