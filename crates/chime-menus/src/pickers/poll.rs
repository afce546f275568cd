use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::menu::{
    FinishView, Menu, MenuError, MenuPolicy, TargetPrincipal, UserId, option_lines,
};
use crate::option::{MenuOption, Symbol};
use crate::persist::{MenuKind, MenuRecord, OptionRecord, PersistError, PersistSpec};
use crate::surface::{MenuStyle, MenuView, Surface, SurfaceError, ViewField};

const POLL_ENDED: &str = "This poll has ended.";
const RESULTS_BAR_LENGTH: usize = 10;

/// Count votes per option from a menu's per-user selection log.
///
/// Single-choice polls count each user's first vote only; multiple-choice
/// polls count every option the user has active.
pub fn tally_votes(
    log: &HashMap<UserId, Vec<Symbol>>,
    order: &[Symbol],
    multiple_choice: bool,
) -> Vec<usize> {
    let mut counts = vec![0usize; order.len()];
    for symbols in log.values() {
        if multiple_choice {
            for symbol in symbols {
                if let Some(slot) = order.iter().position(|s| s == symbol) {
                    counts[slot] += 1;
                }
            }
        } else if let Some(slot) = symbols
            .iter()
            .find_map(|symbol| order.iter().position(|s| s == symbol))
        {
            counts[slot] += 1;
        }
    }
    counts
}

fn results_summary(names: &[&str], counts: &[usize]) -> String {
    let max = counts.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return "No votes received!".to_string();
    }
    let width = names.iter().map(|name| name.len()).max().unwrap_or(0);
    let bar_width = RESULTS_BAR_LENGTH;
    let mut lines = Vec::with_capacity(names.len());
    for (name, &count) in names.iter().zip(counts) {
        let marker = if count == max { "\u{1f3c6}" } else { "  " };
        let bar = "=".repeat(count * RESULTS_BAR_LENGTH / max);
        let plural = if count == 1 { "" } else { "s" };
        lines.push(format!(
            "{marker} {name:<width$} | {bar:<bar_width$} {count} vote{plural}"
        ));
    }
    lines.join("\n")
}

struct PollPolicy {
    multiple_choice: bool,
}

impl MenuPolicy for PollPolicy {
    fn finish<'a>(&'a self, view: FinishView<'a>) -> BoxFuture<'a, Result<(), SurfaceError>> {
        Box::pin(async move {
            let order: Vec<Symbol> = view
                .options
                .iter()
                .map(|option| option.symbol().clone())
                .collect();
            let names: Vec<&str> = view
                .options
                .iter()
                .map(|option| option.display_name())
                .collect();
            let counts = tally_votes(view.selections, &order, self.multiple_choice);

            let mut style = view.style.clone();
            style.footer = POLL_ENDED.to_string();
            view.surface
                .render(MenuView {
                    style,
                    options: option_lines(view.options),
                    fields: vec![ViewField {
                        name: "Results".to_string(),
                        value: results_summary(&names, &counts),
                    }],
                })
                .await
        })
    }
}

/// Saveable vote menu over inert options; the tally is taken and rendered
/// when the poll times out.
#[derive(Debug)]
pub struct PollMenu;

impl PollMenu {
    pub fn build(
        surface: Arc<dyn Surface>,
        choices: Vec<(Symbol, String)>,
        multiple_choice: bool,
        target: Option<TargetPrincipal>,
        mut style: MenuStyle,
    ) -> Result<Arc<Menu>, MenuError> {
        let mut options = Vec::with_capacity(choices.len());
        let mut records = BTreeMap::new();
        for (symbol, display_name) in choices {
            records.insert(
                symbol.sendable(),
                OptionRecord {
                    display_name: display_name.clone(),
                    role: None,
                },
            );
            options.push(MenuOption::inert(symbol, display_name));
        }

        if style.title.is_empty() {
            style.title = "Poll".to_string();
        }
        if style.description.is_empty() {
            style.description = "React to this message to vote!".to_string();
        }
        if style.footer.is_empty() {
            style.footer = if multiple_choice {
                "Voting for more than one option is allowed.".to_string()
            } else {
                "If you vote for more than one option, only your first pick counts.".to_string()
            };
        }

        let menu = Menu::builder(surface)
            .options(options)
            .policy(PollPolicy { multiple_choice })
            .maybe_target(target)
            .style(style)
            .persist(PersistSpec {
                kind: MenuKind::Poll { multiple_choice },
                options: records,
            })
            .build()?;
        Ok(Arc::new(menu))
    }

    pub fn from_record(
        record: &MenuRecord,
        surface: Arc<dyn Surface>,
    ) -> Result<Arc<Menu>, PersistError> {
        let MenuKind::Poll { multiple_choice } = record.kind.clone() else {
            return Err(PersistError::Malformed(
                "record is not a poll menu".to_string(),
            ));
        };
        let choices = record
            .options
            .iter()
            .map(|(symbol, option)| (Symbol::parse(symbol), option.display_name.clone()))
            .collect();
        Self::build(
            surface,
            choices,
            multiple_choice,
            record.target,
            record.style.clone(),
        )
        .map_err(|err| PersistError::Malformed(err.to_string()))
    }
}
