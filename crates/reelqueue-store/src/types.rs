use std::path::PathBuf;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a queued upload.
///
/// `Uploaded` and `Failed` are terminal: nothing moves an item out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Waiting for its scheduled instant.
    Pending,
    /// Claimed by `try_lock`; an upload is in flight.
    Processing,
    /// Published successfully.
    Uploaded,
    /// Gave up; `error` says why.
    Failed,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Uploaded | ItemStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Processing => "processing",
            ItemStatus::Uploaded => "uploaded",
            ItemStatus::Failed => "failed",
        }
    }

    /// Whether `self -> to` is an edge of the item state machine.
    pub fn can_transition_to(self, to: ItemStatus) -> bool {
        matches!(
            (self, to),
            (ItemStatus::Pending, ItemStatus::Processing)
                | (ItemStatus::Pending, ItemStatus::Failed)
                | (ItemStatus::Processing, ItemStatus::Uploaded)
                | (ItemStatus::Processing, ItemStatus::Failed)
        )
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ItemStatus::Pending),
            "processing" => Ok(ItemStatus::Processing),
            "uploaded" => Ok(ItemStatus::Uploaded),
            "failed" => Ok(ItemStatus::Failed),
            other => Err(format!("unknown item status: {other}")),
        }
    }
}

/// Media format; shorts get extra hashtag handling at publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Short,
    Long,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Short => "short",
            MediaKind::Long => "long",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" | "shorts" => Ok(MediaKind::Short),
            "long" | "video" => Ok(MediaKind::Long),
            other => Err(format!("unknown media kind: {other}")),
        }
    }
}

/// A persisted upload item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// UUIDv7 string, unique within the tenant.
    pub id: String,
    /// Media file written by the ingestion layer. Referenced, never copied.
    pub payload_path: PathBuf,
    /// Original client-side file name.
    pub filename: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub kind: MediaKind,
    /// Absolute publication instant. `None` means "hold until scheduled".
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Zone the schedule was authored in.
    pub timezone: Tz,
    pub status: ItemStatus,
    /// Set if and only if `status == Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input to `QueueStore::add`, as produced by the ingestion layer.
///
/// `payload_path` and `kind` are optional here so that missing values are
/// reported as a `Validation` error instead of being impossible to express.
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub payload_path: Option<PathBuf>,
    pub filename: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub kind: Option<MediaKind>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub timezone: String,
}

/// Per-tenant settings document.
///
/// Token values are opaque to the queue; the scheduler only cares whether
/// authorization material is present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token expiry, epoch milliseconds.
    #[serde(default)]
    pub token_expiry: Option<i64>,
    #[serde(default)]
    pub is_setup_complete: bool,
    /// Default publication time of day ("HH:MM") offered by the dashboard.
    #[serde(default)]
    pub schedule_time: Option<String>,
    #[serde(default)]
    pub default_timezone: Option<String>,
}

impl Settings {
    /// Setup counts as complete once the handshake stored a refresh token.
    pub fn setup_complete(&self) -> bool {
        self.is_setup_complete && self.refresh_token.is_some()
    }

    pub fn has_client(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_edges() {
        use ItemStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Uploaded));
        assert!(Processing.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Uploaded));
        assert!(!Processing.can_transition_to(Pending));
        for terminal in [Uploaded, Failed] {
            for to in [Pending, Processing, Uploaded, Failed] {
                assert!(!terminal.can_transition_to(to), "{terminal} -> {to}");
            }
        }
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in ["pending", "processing", "uploaded", "failed"] {
            let status: ItemStatus = s.parse().unwrap();
            assert_eq!(status.as_str(), s);
        }
        assert!("missed".parse::<ItemStatus>().is_err());
    }

    #[test]
    fn media_kind_accepts_form_spellings() {
        assert_eq!("Short".parse::<MediaKind>().unwrap(), MediaKind::Short);
        assert_eq!("long".parse::<MediaKind>().unwrap(), MediaKind::Long);
        assert!("reel".parse::<MediaKind>().is_err());
    }

    #[test]
    fn setup_requires_refresh_token() {
        let mut s = Settings {
            is_setup_complete: true,
            ..Default::default()
        };
        assert!(!s.setup_complete());
        s.refresh_token = Some("r".into());
        assert!(s.setup_complete());
    }
}
