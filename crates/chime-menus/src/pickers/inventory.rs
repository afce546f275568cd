use std::sync::Arc;

use crate::menu::{Menu, MenuError, MenuOutcome, SingleChoice, TargetPrincipal};
use crate::option::{MenuOption, Symbol, symbols};
use crate::surface::{MenuStyle, Surface};

/// Page size cap: one numbered symbol per displayed item.
pub const MAX_ITEMS_PER_PAGE: usize = symbols::NUMBERS.len();

/// Single-choice picker over one page of display items; the first permitted
/// activation is the answer. Not saveable.
#[derive(Debug)]
pub struct ItemPicker;

impl ItemPicker {
    pub fn build(
        surface: Arc<dyn Surface>,
        item_names: Vec<String>,
        target: Option<TargetPrincipal>,
        mut style: MenuStyle,
    ) -> Result<Arc<Menu>, MenuError> {
        if item_names.len() > MAX_ITEMS_PER_PAGE {
            return Err(MenuError::TooManyOptions {
                given: item_names.len(),
                limit: MAX_ITEMS_PER_PAGE,
            });
        }

        let mut options = Vec::with_capacity(item_names.len());
        let mut terminal = Vec::with_capacity(item_names.len());
        for (slot, name) in item_names.into_iter().enumerate() {
            // the page fits the table, checked above
            let Some(symbol) = symbols::number(slot) else {
                break;
            };
            terminal.push(symbol.clone());
            options.push(MenuOption::inert(symbol, name));
        }

        if style.description.is_empty() {
            style.description = "React with an item's number to select it.".to_string();
        }

        let menu = Menu::builder(surface)
            .options(options)
            .policy(SingleChoice::new(terminal))
            .maybe_target(target)
            .style(style)
            .build()?;
        Ok(Arc::new(menu))
    }

    /// Index of the picked item, when the outcome was a choice.
    pub fn picked_index(outcome: &MenuOutcome) -> Option<usize> {
        let MenuOutcome::Chosen(picked) = outcome else {
            return None;
        };
        let last = picked.last()?;
        symbols::NUMBERS
            .iter()
            .position(|glyph| last.sendable() == *glyph)
    }
}

/// Convenience for callers holding an arbitrary symbol: its slot in the
/// numbered table, if any.
pub fn number_slot(symbol: &Symbol) -> Option<usize> {
    symbols::NUMBERS
        .iter()
        .position(|glyph| symbol.sendable() == *glyph)
}
