//! Durability for the in-progress session: reload survival through a local
//! snapshot store, and a best-effort abandonment signal on uncontrolled
//! termination. Neither mechanism is transactional and neither detects
//! conflicts.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::attendance::{AttendanceId, AttendanceSession, ConversationMode};
use crate::domain::lead::{LeadDraft, LeadId, SourceId};
use crate::domain::offer::{DeliveryConfig, Discount, ItemDraft, OfferItem, PaymentConfig};
use crate::domain::product::{KitId, ProductId};
use crate::flows::states::FlowStep;
use crate::store::DispatchError;

/// Fixed key the single in-progress session is stored under.
pub const SESSION_SNAPSHOT_KEY: &str = "attendy-session";

/// The complete recoverable state of one attendance, written after every
/// state-affecting change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub step: FlowStep,
    pub visited: Vec<FlowStep>,
    pub phone_searched: String,
    pub lead_id: Option<LeadId>,
    pub lead_existed: bool,
    pub lead: LeadDraft,
    pub source: Option<SourceId>,
    pub conversation_mode: Option<ConversationMode>,
    pub attendance_id: Option<AttendanceId>,
    pub started_at: DateTime<Utc>,
    pub in_progress: Option<ItemDraft>,
    pub items: Vec<OfferItem>,
    pub discount: Option<Discount>,
    pub shipping_cents: i64,
    pub delivery: DeliveryConfig,
    pub payment: PaymentConfig,
    pub rejected_kits: BTreeMap<ProductId, BTreeSet<KitId>>,
}

/// Empty sessions are never persisted: the flow must be past the phone step
/// with a lead identified.
pub fn snapshot_eligible(step: FlowStep, lead_identified: bool) -> bool {
    step != FlowStep::Phone && lead_identified
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding failure: {0}")]
    Encoding(#[from] serde_json::Error),
}

pub trait SnapshotStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<SessionSnapshot>, SnapshotError>;
    fn save(&self, key: &str, snapshot: &SessionSnapshot) -> Result<(), SnapshotError>;
    fn clear(&self, key: &str) -> Result<(), SnapshotError>;
}

#[derive(Clone, Default)]
pub struct InMemorySnapshotStore {
    entries: Arc<Mutex<BTreeMap<String, SessionSnapshot>>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn load(&self, key: &str) -> Result<Option<SessionSnapshot>, SnapshotError> {
        let entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, snapshot: &SessionSnapshot) -> Result<(), SnapshotError> {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(key.to_owned(), snapshot.clone());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), SnapshotError> {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.remove(key);
        Ok(())
    }
}

/// One JSON file per key under the configured directory; writes go through a
/// temp file and a rename so a crash mid-write never corrupts the previous
/// snapshot.
pub struct JsonFileSnapshotStore {
    directory: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self { directory: directory.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{key}.json"))
    }
}

impl SnapshotStore for JsonFileSnapshotStore {
    fn load(&self, key: &str) -> Result<Option<SessionSnapshot>, SnapshotError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn save(&self, key: &str, snapshot: &SessionSnapshot) -> Result<(), SnapshotError> {
        fs::create_dir_all(&self.directory)?;
        let target = self.path_for(key);
        let staging = self.directory.join(format!("{key}.json.tmp"));
        fs::write(&staging, serde_json::to_vec_pretty(snapshot)?)?;
        fs::rename(&staging, &target)?;
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), SnapshotError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

/// What the beacon sends at termination: enough to create the attendance
/// record if it does not exist yet and mark it incomplete.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AbandonmentNotice {
    pub session: AttendanceSession,
}

#[async_trait]
pub trait AbandonmentBeacon: Send + Sync {
    async fn send(&self, notice: &AbandonmentNotice) -> Result<(), DispatchError>;
}

/// Single-writer cell holding the latest in-progress values. Registered
/// once; updated on every state change; read only at termination time. This
/// is what keeps the termination handler from observing stale state.
#[derive(Clone, Default)]
pub struct TerminationWatch {
    latest: Arc<Mutex<Option<AbandonmentNotice>>>,
}

impl TerminationWatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, notice: Option<AbandonmentNotice>) {
        match self.latest.lock() {
            Ok(mut latest) => *latest = notice,
            Err(poisoned) => *poisoned.into_inner() = notice,
        }
    }

    pub fn latest(&self) -> Option<AbandonmentNotice> {
        match self.latest.lock() {
            Ok(latest) => latest.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Fire-and-forget: a dropped beacon is logged at debug and otherwise
    /// ignored. There is no acknowledgement to wait on.
    pub async fn fire<B>(&self, beacon: &B)
    where
        B: AbandonmentBeacon + ?Sized,
    {
        let Some(notice) = self.latest() else { return };
        if let Err(error) = beacon.send(&notice).await {
            debug!(%error, "abandonment beacon dropped");
        }
    }
}

/// Records notices instead of performing network writes.
#[derive(Clone, Default)]
pub struct InMemoryBeacon {
    sent: Arc<Mutex<Vec<AbandonmentNotice>>>,
    fail: Arc<Mutex<bool>>,
}

impl InMemoryBeacon {
    pub fn sent(&self) -> Vec<AbandonmentNotice> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn fail_sends(&self, fail: bool) {
        match self.fail.lock() {
            Ok(mut flag) => *flag = fail,
            Err(poisoned) => *poisoned.into_inner() = fail,
        }
    }
}

#[async_trait]
impl AbandonmentBeacon for InMemoryBeacon {
    async fn send(&self, notice: &AbandonmentNotice) -> Result<(), DispatchError> {
        let failing = match self.fail.lock() {
            Ok(flag) => *flag,
            Err(poisoned) => *poisoned.into_inner(),
        };
        if failing {
            return Err(DispatchError("beacon refused".to_owned()));
        }
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notice.clone()),
            Err(poisoned) => poisoned.into_inner().push(notice.clone()),
        }
        Ok(())
    }
}
