use std::sync::Arc;

use crate::menu::{Menu, MenuError, MenuOutcome, SingleChoice, TargetPrincipal, UserId};
use crate::option::{MenuOption, symbols};
use crate::surface::{MenuStyle, Surface};

/// Accept/reject prompt restricted to one participant: the first permitted
/// activation is the answer. Not saveable.
#[derive(Debug)]
pub struct ConfirmMenu;

impl ConfirmMenu {
    pub fn build(
        surface: Arc<dyn Surface>,
        target: UserId,
        mut style: MenuStyle,
    ) -> Result<Arc<Menu>, MenuError> {
        if style.title.is_empty() {
            style.title = "Confirm".to_string();
        }

        let menu = Menu::builder(surface)
            .option(MenuOption::inert(symbols::accept(), "Accept"))
            .option(MenuOption::inert(symbols::reject(), "Reject"))
            .policy(SingleChoice::new(vec![symbols::accept(), symbols::reject()]))
            .target(TargetPrincipal::User(target))
            .style(style)
            .build()?;
        Ok(Arc::new(menu))
    }

    /// True on accept, false on reject, None when the menu timed out or was
    /// deleted before an answer.
    pub fn accepted(outcome: &MenuOutcome) -> Option<bool> {
        match outcome {
            MenuOutcome::Chosen(picked) => picked.last().map(|symbol| *symbol == symbols::accept()),
            _ => None,
        }
    }
}
