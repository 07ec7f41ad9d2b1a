/// Storage locators.
///
/// A locator is a vault-relative, `/`-separated path in composed Unicode.
/// Names that come from storage keep their characters (`Q3%20plan.md` is a
/// literal file name). Reference strings written into documents may be
/// URL-encoded (`My%20Note.md`), carry a `./` prefix or Windows separators;
/// `Locator::new` decodes those to the same key.
///
/// In document text a locator is stored with `%` and `\` escaped, so a
/// decoded reference reads back as the exact key that was written.
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use unicode_normalization::UnicodeNormalization;

/// Extension that marks a storage object as a dashboard document.
pub const DOCUMENT_EXTENSION: &str = "dashboard";

/// Normalized path-like identifier for any storage object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locator(String);

impl Locator {
    /// Locator for a reference string: URL-decoded, then cleaned.
    pub fn new(raw: &str) -> Self {
        Self(normalize(raw))
    }

    /// Locator for a name reported by storage. No URL decoding.
    pub fn from_storage(raw: &str) -> Self {
        Self(clean(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Last path segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Extension of the last segment. Dotfiles (`.hidden`) have none.
    pub fn extension(&self) -> Option<&str> {
        self.file_name()
            .rsplit_once('.')
            .filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
            .map(|(_, ext)| ext)
    }

    /// Parent folder, `None` for objects at the vault root.
    pub fn parent(&self) -> Option<Locator> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| Locator(parent.to_string()))
    }

    /// Whether this locator names a dashboard document.
    pub fn is_document(&self) -> bool {
        self.extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(DOCUMENT_EXTENSION))
    }

    /// Whether this locator lies strictly inside `folder`.
    pub fn is_inside(&self, folder: &Locator) -> bool {
        !folder.is_empty()
            && self
                .0
                .strip_prefix(folder.as_str())
                .is_some_and(|rest| rest.len() > 1 && rest.starts_with('/'))
    }

    /// Map a locator inside `from` to the same relative path inside `to`.
    /// Returns `None` when the locator is not inside `from`.
    pub fn rebase(&self, from: &Locator, to: &Locator) -> Option<Locator> {
        if !self.is_inside(from) {
            return None;
        }
        let relative = &self.0[from.0.len() + 1..];
        Some(to.join(relative))
    }

    /// Append a relative path.
    pub fn join(&self, relative: &str) -> Locator {
        if self.is_empty() {
            Locator::from_storage(relative)
        } else {
            Locator::from_storage(&format!("{}/{}", self.0, relative))
        }
    }
}

impl From<String> for Locator {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<&str> for Locator {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.0
    }
}

impl Serialize for Locator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&escape_stored(&self.0))
    }
}

impl<'de> Deserialize<'de> for Locator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Locator::new(&raw))
    }
}

impl AsRef<str> for Locator {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize a reference string.
/// Converts `\` to `/`, decodes `%XX` escapes, then cleans it.
pub fn normalize(raw: &str) -> String {
    clean(&decode_locator(&raw.replace('\\', "/")))
}

/// Inverse of `normalize` for an already clean locator.
fn escape_stored(locator: &str) -> String {
    locator.replace('%', "%25").replace('\\', "%5C")
}

/// Drop `.` and empty segments (which strips `./` and leading `/`) and
/// compose to NFC.
pub fn clean(raw: &str) -> String {
    raw.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
        .nfc()
        .collect()
}

/// Decode URL-encoded path components (%20 -> space, etc).
pub fn decode_locator(raw: &str) -> String {
    percent_encoding::percent_decode_str(raw)
        .decode_utf8_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_dot_slash_and_root() {
        assert_eq!(normalize("./notes/a.md"), "notes/a.md");
        assert_eq!(normalize("/notes/a.md"), "notes/a.md");
        assert_eq!(normalize("notes//./a.md"), "notes/a.md");
        assert_eq!(normalize("notes\\sub\\a.md"), "notes/sub/a.md");
    }

    #[test]
    fn test_normalize_url_encoded() {
        assert_eq!(
            normalize("folder%20with%20space/file.md"),
            "folder with space/file.md"
        );
        assert_eq!(normalize("50%.md"), "50%.md");
    }

    #[test]
    fn test_normalize_nfd_to_nfc() {
        let nfd = "cafe\u{301}.md";
        let nfc = "caf\u{e9}.md";
        assert_eq!(Locator::new(nfd), Locator::new(nfc));
    }

    #[test]
    fn test_normalize_is_stable() {
        for raw in ["./a/b.md", "a%20b.md", "/x/./y.dashboard"] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn test_document_detection() {
        assert!(Locator::new("boards/home.dashboard").is_document());
        assert!(Locator::new("Home.DASHBOARD").is_document());
        assert!(!Locator::new("notes/a.md").is_document());
        assert!(!Locator::new(".dashboard").is_document());
        assert!(!Locator::new("notes").is_document());
    }

    #[test]
    fn test_parent_and_file_name() {
        let loc = Locator::new("a/b/c.md");
        assert_eq!(loc.file_name(), "c.md");
        assert_eq!(loc.parent(), Some(Locator::new("a/b")));
        assert_eq!(Locator::new("c.md").parent(), None);
    }

    #[test]
    fn test_rebase_inside_folder() {
        let from = Locator::new("old");
        let to = Locator::new("new/place");
        assert_eq!(
            Locator::new("old/sub/x.md").rebase(&from, &to),
            Some(Locator::new("new/place/sub/x.md"))
        );
        assert_eq!(Locator::new("older/x.md").rebase(&from, &to), None);
        assert_eq!(Locator::new("old").rebase(&from, &to), None);
    }

    #[test]
    fn test_serde_normalizes() {
        let loc: Locator = serde_json::from_str("\"./a%20b.md\"").unwrap();
        assert_eq!(loc.as_str(), "a b.md");
        assert_eq!(serde_json::to_string(&loc).unwrap(), "\"a b.md\"");
    }

    #[test]
    fn test_storage_names_keep_percent() {
        let loc = Locator::from_storage("boards/Q3%20plan.dashboard");
        assert_eq!(loc.as_str(), "boards/Q3%20plan.dashboard");
        assert!(loc.is_document());
        assert_eq!(
            Locator::from_storage("cafe\u{301}.md"),
            Locator::new("caf\u{e9}.md")
        );
    }

    #[test]
    fn test_serde_escapes_literal_percent() {
        for loc in [
            Locator::from_storage("Q3%20plan.dashboard"),
            Locator::new("100%2541.md"),
            Locator::new("50%.md"),
            Locator::from_storage("odd\\name.md"),
        ] {
            let json = serde_json::to_string(&loc).unwrap();
            let back: Locator = serde_json::from_str(&json).unwrap();
            assert_eq!(back, loc);
        }
        let json = serde_json::to_string(&Locator::new("100%2541.md")).unwrap();
        assert_eq!(json, "\"100%2541.md\"");
        let json = serde_json::to_string(&Locator::new("caf\u{e9}.md")).unwrap();
        assert_eq!(json, "\"caf\u{e9}.md\"");
    }

    #[test]
    fn test_join_does_not_decode() {
        let folder = Locator::from_storage("a%41");
        assert_eq!(folder.join("b%20c.md").as_str(), "a%41/b%20c.md");
    }
}
