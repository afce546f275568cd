use std::sync::Arc;

use crate::menu::{Menu, MenuError, MenuOutcome, SingleChoice, TargetPrincipal, UserId};
use crate::option::{MenuOption, symbols};
use crate::surface::{MenuStyle, Surface};

/// Single-user multi-select over numbered layer options, closed by
/// select-all, submit, or cancel. Not saveable.
#[derive(Debug)]
pub struct RegionPicker;

impl RegionPicker {
    /// `layers` are 1-based indexes into the numbered symbol table.
    pub fn build(
        surface: Arc<dyn Surface>,
        owner: UserId,
        layers: &[u8],
        mut style: MenuStyle,
    ) -> Result<Arc<Menu>, MenuError> {
        if layers.is_empty() {
            return Err(MenuError::InvalidOptions(
                "a region picker needs at least one layer".to_string(),
            ));
        }
        if layers
            .iter()
            .any(|&n| n == 0 || usize::from(n) >= symbols::NUMBERS.len())
        {
            return Err(MenuError::InvalidOptions(format!(
                "layer numbers must be between 1 and {}",
                symbols::NUMBERS.len() - 1
            )));
        }

        let mut options = vec![MenuOption::inert(symbols::select_all(), "Select all")];
        for &layer in layers {
            // bounds checked above
            if let Some(symbol) = symbols::number(usize::from(layer)) {
                options.push(MenuOption::inert(symbol, format!("Layer {layer}")));
            }
        }
        options.push(MenuOption::inert(symbols::submit(), "Submit"));
        options.push(MenuOption::inert(symbols::cancel(), "Cancel"));

        if style.description.is_empty() {
            let plural = if layers.len() == 1 { "" } else { "s" };
            style.description = format!(
                "This item has **{}** optional region{plural}.\nWhich regions would you like to change?",
                layers.len()
            );
        }

        let menu = Menu::builder(surface)
            .options(options)
            .policy(SingleChoice::new(vec![
                symbols::select_all(),
                symbols::submit(),
                symbols::cancel(),
            ]))
            .target(TargetPrincipal::User(owner))
            .style(style)
            .build()?;
        Ok(Arc::new(menu))
    }

    /// The chosen layer set: empty on cancel, everything on select-all, the
    /// toggled layers on submit. None when the menu timed out or was
    /// deleted.
    pub fn chosen_regions(outcome: &MenuOutcome, layers: &[u8]) -> Option<Vec<u8>> {
        let MenuOutcome::Chosen(picked) = outcome else {
            return None;
        };
        let last = picked.last()?;
        if *last == symbols::cancel() {
            return Some(Vec::new());
        }
        if *last == symbols::select_all() {
            return Some(layers.to_vec());
        }
        if *last != symbols::submit() {
            return None;
        }
        let mut chosen = Vec::new();
        for symbol in &picked[..picked.len() - 1] {
            if let Some(slot) = symbols::NUMBERS
                .iter()
                .position(|glyph| symbol.sendable() == *glyph)
            {
                let slot = slot as u8;
                if layers.contains(&slot) {
                    chosen.push(slot);
                }
            }
        }
        Some(chosen)
    }
}
