use std::fmt;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::menu::{MenuError, Participant};
use crate::surface::SurfaceId;

/// Discrete trigger symbol bound to a menu option: either a unicode glyph
/// or an opaque platform-custom id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    Unicode(String),
    Custom(u64),
}

impl Symbol {
    pub fn unicode(glyph: &str) -> Self {
        Self::Unicode(glyph.to_string())
    }

    /// The string form used on the wire and in persisted records.
    pub fn sendable(&self) -> String {
        match self {
            Self::Unicode(glyph) => glyph.clone(),
            Self::Custom(id) => format!("custom:{id}"),
        }
    }

    pub fn parse(text: &str) -> Self {
        match text.strip_prefix("custom:").and_then(|id| id.parse().ok()) {
            Some(id) => Self::Custom(id),
            None => Self::Unicode(text.to_string()),
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sendable())
    }
}

impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.sendable())
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Self::parse(&text))
    }
}

/// Default trigger symbols shared by the picker presets.
pub mod symbols {
    use super::Symbol;

    /// Numbered option glyphs, index 0 through 10.
    pub const NUMBERS: [&str; 11] = [
        "0\u{fe0f}\u{20e3}",
        "1\u{fe0f}\u{20e3}",
        "2\u{fe0f}\u{20e3}",
        "3\u{fe0f}\u{20e3}",
        "4\u{fe0f}\u{20e3}",
        "5\u{fe0f}\u{20e3}",
        "6\u{fe0f}\u{20e3}",
        "7\u{fe0f}\u{20e3}",
        "8\u{fe0f}\u{20e3}",
        "9\u{fe0f}\u{20e3}",
        "\u{1f51f}",
    ];

    pub fn number(n: usize) -> Option<Symbol> {
        NUMBERS.get(n).map(|glyph| Symbol::unicode(glyph))
    }

    pub fn submit() -> Symbol {
        Symbol::unicode("\u{2705}")
    }

    pub fn cancel() -> Symbol {
        Symbol::unicode("\u{274e}")
    }

    pub fn select_all() -> Symbol {
        Symbol::unicode("\u{1f300}")
    }

    pub fn accept() -> Symbol {
        Symbol::unicode("\u{1f44d}")
    }

    pub fn reject() -> Symbol {
        Symbol::unicode("\u{1f44e}")
    }
}

/// Context handed to option behaviors on dispatch.
#[derive(Debug, Clone)]
pub struct TriggerCtx {
    pub surface: SurfaceId,
    pub participant: Participant,
    pub symbol: Symbol,
}

/// Separate activate/deactivate behaviors bound to one option.
pub trait OptionBehavior: Send + Sync {
    fn on_activate<'a>(&'a self, ctx: &'a TriggerCtx) -> BoxFuture<'a, Result<(), MenuError>>;

    fn on_deactivate<'a>(&'a self, ctx: &'a TriggerCtx) -> BoxFuture<'a, Result<(), MenuError>>;
}

/// Behavior that does nothing; poll options and informational entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct InertBehavior;

impl OptionBehavior for InertBehavior {
    fn on_activate<'a>(&'a self, _ctx: &'a TriggerCtx) -> BoxFuture<'a, Result<(), MenuError>> {
        Box::pin(async { Ok(()) })
    }

    fn on_deactivate<'a>(&'a self, _ctx: &'a TriggerCtx) -> BoxFuture<'a, Result<(), MenuError>> {
        Box::pin(async { Ok(()) })
    }
}

/// A named unit of interactive behavior bound to a trigger symbol, unique
/// within its owning menu.
pub struct MenuOption {
    symbol: Symbol,
    display_name: String,
    behavior: Box<dyn OptionBehavior>,
}

impl fmt::Debug for MenuOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MenuOption")
            .field("symbol", &self.symbol)
            .field("display_name", &self.display_name)
            .finish()
    }
}

impl MenuOption {
    pub fn new(
        symbol: Symbol,
        display_name: impl Into<String>,
        behavior: Box<dyn OptionBehavior>,
    ) -> Self {
        Self {
            symbol,
            display_name: display_name.into(),
            behavior,
        }
    }

    /// An option with no behavior beyond being selectable.
    pub fn inert(symbol: Symbol, display_name: impl Into<String>) -> Self {
        Self::new(symbol, display_name, Box::new(InertBehavior))
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub(crate) fn behavior(&self) -> &dyn OptionBehavior {
        self.behavior.as_ref()
    }
}
