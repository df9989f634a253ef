//! Core types for metastudy

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::Error;

/// Versioned identifier of a document (e.g. `2401.01234v3`)
///
/// The identifier is opaque apart from its trailing `v<N>` suffix, which is
/// parsed as a positive integer.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId {
    raw: String,
    base_len: usize,
    version: u32,
}

// The pattern is a literal, so compilation cannot fail at runtime
#[allow(clippy::expect_used)]
fn item_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Lazy base so the last v<N> is taken as the version suffix
        Regex::new(r"^(?P<base>.+?)v(?P<version>\d+)$").expect("valid item id pattern")
    })
}

impl ItemId {
    /// Build an id from a base identifier and a version number
    pub fn new(base: &str, version: u32) -> crate::Result<Self> {
        Self::parse(&format!("{base}v{version}"))
    }

    /// Parse a versioned identifier
    pub fn parse(raw: &str) -> crate::Result<Self> {
        let raw = raw.trim();
        let caps = item_id_pattern()
            .captures(raw)
            .ok_or_else(|| Error::InvalidItemId(raw.to_string()))?;

        let base = caps
            .name("base")
            .map(|m| m.as_str())
            .ok_or_else(|| Error::InvalidItemId(raw.to_string()))?;
        let version = caps
            .name("version")
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .filter(|v| *v >= 1)
            .ok_or_else(|| Error::InvalidItemId(raw.to_string()))?;

        Ok(Self {
            raw: raw.to_string(),
            base_len: base.len(),
            version,
        })
    }

    /// Full identifier including the version suffix
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Identifier without the version suffix
    pub fn base(&self) -> &str {
        &self.raw[..self.base_len]
    }

    /// Parsed version number (always >= 1)
    pub fn version(&self) -> u32 {
        self.version
    }

    /// The same item at `version - 1`, or `None` for version 1
    pub fn previous(&self) -> Option<ItemId> {
        if self.version <= 1 {
            return None;
        }
        let prev = self.version - 1;
        Some(Self {
            raw: format!("{}v{}", self.base(), prev),
            base_len: self.base_len,
            version: prev,
        })
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for ItemId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ItemId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.raw
    }
}

/// File name stem for artifacts of `item_id`
///
/// Old-style identifiers contain a slash (`hep-th/9901001v2`), which is
/// flattened so every artifact lands directly in its directory.
pub fn artifact_stem(item_id: &str) -> String {
    item_id.replace(['/', '\\'], "_")
}

/// Identifier of a question in the catalog
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(pub i64);

/// Identifier of a label in the catalog
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelId(pub i64);

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of an entry in the download queue
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DownloadStatus {
    /// Waiting for the orchestrator
    Pending,
    /// An artifact was acquired
    Completed,
    /// Every applicable strategy failed
    Failed,
}

impl DownloadStatus {
    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Pending => "PENDING",
            DownloadStatus::Completed => "COMPLETED",
            DownloadStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(DownloadStatus::Pending),
            "COMPLETED" => Ok(DownloadStatus::Completed),
            "FAILED" => Ok(DownloadStatus::Failed),
            other => Err(Error::Other(format!("unknown download status '{other}'"))),
        }
    }
}

/// A claimed labeling job (ephemeral once popped from the queue)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LabelingJob {
    /// Metadata identifier of the item to classify
    pub item_id: String,
    /// Question to evaluate against the item
    pub question_id: QuestionId,
}

/// Question from the catalog
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Question id
    pub id: QuestionId,
    /// Natural-language prompt
    pub prompt: String,
    /// Label applied when the answer is affirmative
    pub label_id: LabelId,
}

/// Classification input text for an item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemText {
    /// Item title
    pub title: String,
    /// Item abstract
    #[serde(rename = "abstract")]
    pub abstract_text: String,
}

/// Result of a single classification call
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the item answers the question affirmatively
    pub answer: bool,
    /// Confidence in `[0, 1]`, `None` when the backend gave no usable value
    pub confidence: Option<f64>,
}

impl Verdict {
    /// Negative verdict with unknown confidence
    pub fn negative() -> Self {
        Self {
            answer: false,
            confidence: None,
        }
    }
}

/// Counters returned by a download orchestrator run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadStats {
    /// Number of items asked for
    pub requested: usize,
    /// Number of items actually processed
    pub attempted: usize,
    /// Items marked Completed
    pub completed: usize,
    /// Items marked Failed
    pub failed: usize,
    /// Items whose final status could not be written to the store
    pub unrecorded: usize,
}

/// Counters returned by a labeling pipeline run
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelingStats {
    /// Jobs that produced a verdict
    pub processed: usize,
    /// Affirmative verdicts persisted as labels
    pub labeled: usize,
    /// Jobs dropped because the question or item text was missing
    pub skipped_missing: usize,
    /// Jobs lost to failures in classification or commit
    pub errors: usize,
    /// Wall-clock duration of the run
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

/// Snapshot of the persistent queues
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Download items waiting
    pub downloads_pending: i64,
    /// Download items completed
    pub downloads_completed: i64,
    /// Download items failed
    pub downloads_failed: i64,
    /// Labeling jobs waiting
    pub labeling_queued: i64,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn item_id_parses_base_and_version() {
        let id = ItemId::parse("2401.01234v3").unwrap();
        assert_eq!(id.base(), "2401.01234");
        assert_eq!(id.version(), 3);
        assert_eq!(id.as_str(), "2401.01234v3");
    }

    #[test]
    fn item_id_handles_old_style_identifiers() {
        let id = ItemId::parse("hep-th/9901001v2").unwrap();
        assert_eq!(id.base(), "hep-th/9901001");
        assert_eq!(id.version(), 2);
    }

    #[test]
    fn item_id_takes_last_version_suffix() {
        // Base itself contains a 'v' followed by digits
        let id = ItemId::parse("solv-int/9707v1v4").unwrap();
        assert_eq!(id.version(), 4);
        assert_eq!(id.base(), "solv-int/9707v1");
    }

    #[test]
    fn item_id_rejects_missing_or_zero_version() {
        assert!(ItemId::parse("2401.01234").is_err());
        assert!(ItemId::parse("2401.01234v").is_err());
        assert!(ItemId::parse("2401.01234v0").is_err());
        assert!(ItemId::parse("").is_err());
    }

    #[test]
    fn previous_version_is_version_minus_one() {
        let id = ItemId::parse("Q-v3").unwrap();
        let prev = id.previous().unwrap();
        assert_eq!(prev.as_str(), "Q-v2");
        assert_eq!(prev.version(), 2);
        assert_eq!(prev.previous().unwrap().as_str(), "Q-v1");
    }

    #[test]
    fn previous_version_undefined_for_v1() {
        let id = ItemId::parse("P-v1").unwrap();
        assert!(id.previous().is_none());
    }

    #[test]
    fn artifact_stem_flattens_slashes() {
        assert_eq!(artifact_stem("hep-th/9901001v2"), "hep-th_9901001v2");
        assert_eq!(artifact_stem("2401.01234v1"), "2401.01234v1");
    }

    #[test]
    fn item_id_serde_uses_plain_string() {
        let id = ItemId::parse("2401.01234v2").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"2401.01234v2\"");
        let back: ItemId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<ItemId>("\"no-version\"").is_err());
    }

    #[test]
    fn download_status_parses_case_insensitively() {
        assert_eq!(
            "completed".parse::<DownloadStatus>().unwrap(),
            DownloadStatus::Completed
        );
        assert_eq!(
            "PENDING".parse::<DownloadStatus>().unwrap(),
            DownloadStatus::Pending
        );
        assert!("DONE".parse::<DownloadStatus>().is_err());
    }

    #[test]
    fn item_text_serializes_abstract_field_name() {
        let text = ItemText {
            title: "t".to_string(),
            abstract_text: "a".to_string(),
        };
        let json = serde_json::to_value(&text).unwrap();
        assert_eq!(json["abstract"], "a");
    }
}
