use std::fmt::Display;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::option::Symbol;

/// Identity of the external surface a menu is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceId(pub u64);

impl Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    /// The surface was removed or is no longer writable. Menus treat this
    /// as an implicit deletion, not a hard failure.
    #[error("surface is unavailable")]
    Unavailable,

    #[error("surface rendering failed: {0}")]
    Render(String),
}

/// Presentation metadata carried by a menu and persisted with it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MenuStyle {
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub footer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accent: Option<[u8; 3]>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon: String,
}

/// One option row in a rendered menu.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionLine {
    pub symbol: Symbol,
    pub display_name: String,
}

/// Extra name/value block appended below the option list, e.g. poll
/// results.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewField {
    pub name: String,
    pub value: String,
}

/// Everything a surface needs to draw a menu.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MenuView {
    pub style: MenuStyle,
    pub options: Vec<OptionLine>,
    pub fields: Vec<ViewField>,
}

/// The external drawing target for a menu.
pub trait Surface: Send + Sync {
    fn id(&self) -> SurfaceId;

    fn render(&self, view: MenuView) -> BoxFuture<'_, Result<(), SurfaceError>>;

    /// Best-effort cleanup when a menu is deleted.
    fn clear(&self) -> BoxFuture<'_, Result<(), SurfaceError>>;
}
