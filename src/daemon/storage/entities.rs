use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::time::local_date;

/// Buckets applications are sorted into. The order of the variants is the order in which the
/// keyword sets are checked during classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppCategory {
    Coding,
    Meeting,
    Browser,
    Communication,
    Productivity,
    Other,
}

impl AppCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppCategory::Coding => "coding",
            AppCategory::Meeting => "meeting",
            AppCategory::Browser => "browser",
            AppCategory::Communication => "communication",
            AppCategory::Productivity => "productivity",
            AppCategory::Other => "other",
        }
    }
}

/// One tick of the window sampler. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySample {
    pub timestamp: DateTime<Utc>,
    /// SHA-256 of the window title. The title itself is never kept.
    pub window_fingerprint: Arc<str>,
    pub app_name: Arc<str>,
    pub category: AppCategory,
    pub is_active: bool,
}

impl ActivitySample {
    pub fn date(&self) -> NaiveDate {
        local_date(self.timestamp)
    }
}

/// The only artifact ever derived from screen content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotHashRecord {
    pub timestamp: DateTime<Utc>,
    pub hash: Arc<str>,
}

impl ScreenshotHashRecord {
    pub fn date(&self) -> NaiveDate {
        local_date(self.timestamp)
    }
}

/// Per-day rollup of active minutes. `total_active_minutes` always equals the sum of the
/// category fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub total_active_minutes: f64,
    pub coding_minutes: f64,
    pub meeting_minutes: f64,
    pub browser_minutes: f64,
    pub communication_minutes: f64,
    pub productivity_minutes: f64,
    #[serde(default)]
    pub other_minutes: f64,
    /// Merkle root over the day's stored sample envelopes. Set once the day is sealed.
    pub merkle_root: Option<String>,
    pub submitted_to_chain: bool,
    /// Identifier returned by the blob sink for the latest successful forward.
    pub blob_id: Option<String>,
}

impl DailyAggregate {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_active_minutes: 0.,
            coding_minutes: 0.,
            meeting_minutes: 0.,
            browser_minutes: 0.,
            communication_minutes: 0.,
            productivity_minutes: 0.,
            other_minutes: 0.,
            merkle_root: None,
            submitted_to_chain: false,
            blob_id: None,
        }
    }

    pub fn category_sum(&self) -> f64 {
        self.coding_minutes
            + self.meeting_minutes
            + self.browser_minutes
            + self.communication_minutes
            + self.productivity_minutes
            + self.other_minutes
    }

    pub fn minutes_mut(&mut self, category: AppCategory) -> &mut f64 {
        match category {
            AppCategory::Coding => &mut self.coding_minutes,
            AppCategory::Meeting => &mut self.meeting_minutes,
            AppCategory::Browser => &mut self.browser_minutes,
            AppCategory::Communication => &mut self.communication_minutes,
            AppCategory::Productivity => &mut self.productivity_minutes,
            AppCategory::Other => &mut self.other_minutes,
        }
    }
}

/// Authenticated encryption output stored or transmitted in place of plaintext.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    #[serde(with = "base64_ser")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "base64_ser")]
    pub nonce: Vec<u8>,
    #[serde(with = "base64_ser")]
    pub tag: Vec<u8>,
}

impl std::fmt::Debug for EncryptedEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedEnvelope")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("nonce_len", &self.nonce.len())
            .field("tag_len", &self.tag.len())
            .finish()
    }
}

mod base64_ser {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
