/// Storage lifecycle events and content fingerprints.
use serde::{Deserialize, Serialize};

use crate::locator::Locator;

/// SHA-256 fingerprint of text content with normalized line endings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentFingerprint(pub String);

impl ContentFingerprint {
    pub fn from_content(content: &str) -> Self {
        use sha2::{Digest, Sha256};
        let normalized = content.replace("\r\n", "\n");
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }
}

/// Events emitted by a storage backend when objects change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StorageEvent {
    Renamed { from: Locator, to: Locator },
    Deleted { locator: Locator },
    Modified { locator: Locator },
    Created { locator: Locator },
}

impl StorageEvent {
    /// The locator the object has after the event.
    pub fn locator(&self) -> &Locator {
        match self {
            Self::Renamed { to, .. } => to,
            Self::Deleted { locator } | Self::Modified { locator } | Self::Created { locator } => {
                locator
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_normalized_line_endings() {
        let fp1 = ContentFingerprint::from_content("line1\nline2");
        let fp2 = ContentFingerprint::from_content("line1\r\nline2");
        assert_eq!(fp1, fp2);
        assert_ne!(fp1, ContentFingerprint::from_content("line1\nline3"));
    }

    #[test]
    fn test_event_json_shape() {
        let event = StorageEvent::Renamed {
            from: Locator::new("a.md"),
            to: Locator::new("b.md"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "renamed");
        assert_eq!(json["from"], "a.md");
        assert_eq!(event.locator(), &Locator::new("b.md"));
    }
}
