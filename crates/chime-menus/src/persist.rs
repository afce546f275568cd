use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::menu::TargetPrincipal;
use crate::surface::{MenuStyle, Surface, SurfaceId};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("menu is not saveable")]
    NotSaveable,

    #[error("unknown surface {0}")]
    UnknownSurface(SurfaceId),

    #[error("malformed record: {0}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Which preset a record rebuilds into, with its kind-specific data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MenuKind {
    RolePicker,
    Poll { multiple_choice: bool },
}

/// Enough information to reconstruct one option's behavior binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionRecord {
    pub display_name: String,
    /// The bound role for role-picker options; absent for inert options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<u64>,
}

/// One persisted saveable menu.
///
/// `expires_at_epoch` is always the absolute instant in epoch seconds,
/// never a relative delta: a menu with three minutes left before a restart
/// still expires at its original deadline after rehydration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuRecord {
    pub surface: SurfaceId,
    #[serde(flatten)]
    pub kind: MenuKind,
    pub options: BTreeMap<String, OptionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_epoch: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetPrincipal>,
    #[serde(default)]
    pub style: MenuStyle,
}

/// Construction-time persistence data carried by a saveable menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistSpec {
    pub kind: MenuKind,
    pub options: BTreeMap<String, OptionRecord>,
}

/// Resolves persisted surface ids back to live surfaces on rehydration.
pub trait SurfaceResolver: Send + Sync {
    fn resolve(&self, id: SurfaceId) -> Option<Arc<dyn Surface>>;
}

pub fn epoch_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// Remaining delay until an absolute epoch deadline; zero once past, so an
/// overdue menu expires immediately on rehydration.
pub fn remaining_delay(expires_at_epoch: u64, now_epoch: u64) -> Duration {
    Duration::from_secs(expires_at_epoch.saturating_sub(now_epoch))
}

pub fn save_records(path: &Path, records: &[MenuRecord]) -> Result<(), PersistError> {
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn load_records(path: &Path) -> Result<Vec<MenuRecord>, PersistError> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}
