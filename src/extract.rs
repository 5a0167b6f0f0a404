use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href=['"](https?://[^\s'"]+)['"]"#).unwrap());
static BARE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s'"<>]+"#).unwrap());

/// A link found in a cell, not yet verified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UrlCandidate(String);

impl UrlCandidate {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for UrlCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UrlCandidate {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Find a link in raw cell content. Anchor `href` values win over bare URLs,
/// even when the bare URL appears earlier in the text.
pub fn extract(cell: Option<&str>) -> Option<UrlCandidate> {
    let text = cell?;
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = HREF_RE.captures(text) {
        return Some(UrlCandidate(caps[1].to_string()));
    }

    BARE_URL_RE
        .find(text)
        .map(|m| UrlCandidate(m.as_str().to_string()))
}

/// First hit across `cells`, with the position of the cell it came from.
pub fn extract_first<'a, I>(cells: I) -> Option<(usize, UrlCandidate)>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    cells
        .into_iter()
        .enumerate()
        .find_map(|(pos, cell)| extract(cell).map(|url| (pos, url)))
}
