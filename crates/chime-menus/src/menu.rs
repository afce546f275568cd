use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, warn};

use chime_core::TimedTask;

use crate::option::{MenuOption, Symbol, TriggerCtx};
use crate::persist::{MenuRecord, PersistError, PersistSpec};
use crate::registry::MenuMap;
use crate::surface::{MenuStyle, MenuView, OptionLine, Surface, SurfaceError, SurfaceId};

/// Identity of a user behind a trigger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub u64);

/// Identity of a grantable role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleId(pub u64);

/// The principal behind an inbound trigger event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub user: UserId,
    pub roles: Vec<RoleId>,
}

impl Participant {
    pub fn user(id: u64) -> Self {
        Self {
            user: UserId(id),
            roles: Vec::new(),
        }
    }

    pub fn with_roles(id: u64, roles: impl IntoIterator<Item = u64>) -> Self {
        Self {
            user: UserId(id),
            roles: roles.into_iter().map(RoleId).collect(),
        }
    }
}

/// Restriction on who may interact with a menu: one user, or holders of one
/// role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPrincipal {
    User(UserId),
    Role(RoleId),
}

impl TargetPrincipal {
    pub fn permits(&self, participant: &Participant) -> bool {
        match self {
            Self::User(id) => participant.user == *id,
            Self::Role(id) => participant.roles.contains(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuState {
    Active,
    Expired,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAction {
    Activate,
    Deactivate,
}

/// An inbound `(symbol, action, principal)` event.
#[derive(Debug, Clone)]
pub struct TriggerEvent {
    pub symbol: Symbol,
    pub action: TriggerAction,
    pub participant: Participant,
}

impl TriggerEvent {
    pub fn activate(symbol: Symbol, participant: Participant) -> Self {
        Self {
            symbol,
            action: TriggerAction::Activate,
            participant,
        }
    }

    pub fn deactivate(symbol: Symbol, participant: Participant) -> Self {
        Self {
            symbol,
            action: TriggerAction::Deactivate,
            participant,
        }
    }
}

/// What happened to a routed trigger event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The matching option behavior ran.
    Handled,
    /// The event resolved a single-choice menu; the menu is now terminal.
    Resolved(Vec<Symbol>),
    /// No state change: unknown surface or symbol, inactive menu, or a
    /// principal the menu is not targeted at.
    Ignored,
}

/// Terminal result a waiter observes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuOutcome {
    /// A terminal activation; the participant's selections in arrival
    /// order, the terminal symbol last.
    Chosen(Vec<Symbol>),
    TimedOut,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum MenuError {
    #[error("surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[error("option behavior failed: {0}")]
    Behavior(String),

    #[error("duplicate option symbol {0}")]
    DuplicateSymbol(Symbol),

    #[error("too many options: {given} (limit {limit})")]
    TooManyOptions { given: usize, limit: usize },

    #[error("invalid option set: {0}")]
    InvalidOptions(String),
}

/// Snapshot handed to [`MenuPolicy::finish`] when a menu expires.
pub struct FinishView<'a> {
    pub surface: &'a dyn Surface,
    pub style: &'a MenuStyle,
    pub options: &'a [MenuOption],
    /// Per-user activation log in arrival order.
    pub selections: &'a HashMap<UserId, Vec<Symbol>>,
}

/// Varies menu behavior without subclassing: which symbols terminate a
/// single-choice menu, and how the surface is repainted on expiry.
pub trait MenuPolicy: Send + Sync {
    fn is_terminal(&self, _symbol: &Symbol) -> bool {
        false
    }

    fn finish<'a>(&'a self, view: FinishView<'a>) -> BoxFuture<'a, Result<(), SurfaceError>>;
}

/// Text edited into menus that reached their timeout.
pub const EXPIRED_NOTICE: &str = "This menu has expired.";

/// Policy for open-ended toggle menus: nothing is terminal; expiry repaints
/// the surface with an expired notice in the footer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToggleUntilTimeout;

impl MenuPolicy for ToggleUntilTimeout {
    fn finish<'a>(&'a self, view: FinishView<'a>) -> BoxFuture<'a, Result<(), SurfaceError>> {
        Box::pin(render_finished(view, EXPIRED_NOTICE))
    }
}

/// Policy for single-choice menus: the listed symbols are terminal and the
/// first permitted activation of one resolves the menu.
#[derive(Debug, Clone)]
pub struct SingleChoice {
    terminal: Vec<Symbol>,
}

impl SingleChoice {
    pub fn new(terminal: Vec<Symbol>) -> Self {
        Self { terminal }
    }
}

impl MenuPolicy for SingleChoice {
    fn is_terminal(&self, symbol: &Symbol) -> bool {
        self.terminal.contains(symbol)
    }

    fn finish<'a>(&'a self, view: FinishView<'a>) -> BoxFuture<'a, Result<(), SurfaceError>> {
        Box::pin(render_finished(view, EXPIRED_NOTICE))
    }
}

pub(crate) fn option_lines(options: &[MenuOption]) -> Vec<OptionLine> {
    options
        .iter()
        .map(|option| OptionLine {
            symbol: option.symbol().clone(),
            display_name: option.display_name().to_string(),
        })
        .collect()
}

/// Repaint an expired menu with `footer` replacing the style footer.
pub(crate) async fn render_finished(
    view: FinishView<'_>,
    footer: &str,
) -> Result<(), SurfaceError> {
    let mut style = view.style.clone();
    style.footer = footer.to_string();
    view.surface
        .render(MenuView {
            style,
            options: option_lines(view.options),
            fields: Vec::new(),
        })
        .await
}

struct MenuCell {
    state: MenuState,
    selections: HashMap<UserId, Vec<Symbol>>,
    waiter: Option<oneshot::Sender<MenuOutcome>>,
    timeout: Option<TimedTask>,
    timeout_epoch: Option<u64>,
    registry: Option<Weak<MenuMap>>,
}

/// A stateful, optionally persisted, optionally timed interactive choice
/// surface.
pub struct Menu {
    surface: Arc<dyn Surface>,
    options: Vec<MenuOption>,
    target: Option<TargetPrincipal>,
    style: MenuStyle,
    policy: Box<dyn MenuPolicy>,
    persist: Option<PersistSpec>,
    cell: Mutex<MenuCell>,
    outcome_rx: Mutex<Option<oneshot::Receiver<MenuOutcome>>>,
}

impl fmt::Debug for Menu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Menu")
            .field("surface", &self.surface.id())
            .field("options", &self.options)
            .field("target", &self.target)
            .field("saveable", &self.saveable())
            .finish()
    }
}

impl Menu {
    pub fn builder(surface: Arc<dyn Surface>) -> MenuBuilder {
        MenuBuilder {
            surface,
            options: Vec::new(),
            target: None,
            style: MenuStyle::default(),
            policy: Box::new(ToggleUntilTimeout),
            persist: None,
        }
    }

    pub fn surface_id(&self) -> SurfaceId {
        self.surface.id()
    }

    pub fn options(&self) -> &[MenuOption] {
        &self.options
    }

    pub fn target(&self) -> Option<&TargetPrincipal> {
        self.target.as_ref()
    }

    pub fn style(&self) -> &MenuStyle {
        &self.style
    }

    pub fn saveable(&self) -> bool {
        self.persist.is_some()
    }

    pub async fn state(&self) -> MenuState {
        self.cell.lock().await.state
    }

    /// The participant's current selections in arrival order.
    pub async fn selections_for(&self, user: UserId) -> Vec<Symbol> {
        self.cell
            .lock()
            .await
            .selections
            .get(&user)
            .cloned()
            .unwrap_or_default()
    }

    /// The timeout task expiring this menu, if one was scheduled.
    pub async fn timeout_task(&self) -> Option<TimedTask> {
        self.cell.lock().await.timeout.clone()
    }

    /// Repaint the surface from current state. Owners call this after any
    /// mutation that should be visually reflected.
    pub async fn refresh(&self) -> Result<(), MenuError> {
        let view = self.view();
        Ok(self.surface.render(view).await?)
    }

    pub fn view(&self) -> MenuView {
        MenuView {
            style: self.style.clone(),
            options: option_lines(&self.options),
            fields: Vec::new(),
        }
    }

    /// Dispatch one inbound trigger event against this menu.
    ///
    /// Ignored events change no state and invoke no behavior; behavior
    /// errors propagate to the event-routing caller.
    pub async fn handle_trigger(&self, event: &TriggerEvent) -> Result<Dispatch, MenuError> {
        let Some(option) = self
            .options
            .iter()
            .find(|option| option.symbol() == &event.symbol)
        else {
            return Ok(Dispatch::Ignored);
        };

        let terminal =
            event.action == TriggerAction::Activate && self.policy.is_terminal(&event.symbol);
        let chosen = {
            let mut cell = self.cell.lock().await;
            if cell.state != MenuState::Active {
                return Ok(Dispatch::Ignored);
            }
            if let Some(target) = &self.target {
                if !target.permits(&event.participant) {
                    debug!(
                        surface = %self.surface.id(),
                        user = event.participant.user.0,
                        "trigger from non-target principal ignored"
                    );
                    return Ok(Dispatch::Ignored);
                }
            }
            let entry = cell.selections.entry(event.participant.user).or_default();
            if terminal {
                // the terminal symbol closes the answer, it is not part of
                // the toggled selection set
                let mut chosen = entry.clone();
                chosen.push(event.symbol.clone());
                Some(chosen)
            } else {
                match event.action {
                    TriggerAction::Activate => {
                        if !entry.contains(&event.symbol) {
                            entry.push(event.symbol.clone());
                        }
                    }
                    TriggerAction::Deactivate => {
                        entry.retain(|symbol| symbol != &event.symbol);
                    }
                }
                None
            }
        };

        let ctx = TriggerCtx {
            surface: self.surface.id(),
            participant: event.participant.clone(),
            symbol: event.symbol.clone(),
        };
        match event.action {
            TriggerAction::Activate => option.behavior().on_activate(&ctx).await?,
            TriggerAction::Deactivate => option.behavior().on_deactivate(&ctx).await?,
        }

        match chosen {
            Some(chosen) => {
                self.resolve(MenuOutcome::Chosen(chosen.clone())).await;
                Ok(Dispatch::Resolved(chosen))
            }
            None => Ok(Dispatch::Handled),
        }
    }

    /// Wait for this menu's terminal outcome. One waiter per menu.
    pub async fn outcome(&self) -> MenuOutcome {
        let receiver = self.outcome_rx.lock().await.take();
        match receiver {
            Some(receiver) => receiver.await.unwrap_or(MenuOutcome::Cancelled),
            None => MenuOutcome::Cancelled,
        }
    }

    /// Timeout transition: options disabled, waiter notified, surface
    /// repainted by the policy. Idempotent once terminal.
    pub async fn expire(&self) {
        let Some((waiter, timeout)) = self.enter_terminal(MenuState::Expired).await else {
            return;
        };
        self.remove_registry_entry().await;
        if let Some(task) = timeout {
            // the task may be this very expiry's trigger, in which case it
            // is already completed and this is a no-op
            let _ = task.force_expire(false).await;
        }
        if let Some(waiter) = waiter {
            let _ = waiter.send(MenuOutcome::TimedOut);
        }

        let selections = { self.cell.lock().await.selections.clone() };
        let view = FinishView {
            surface: self.surface.as_ref(),
            style: &self.style,
            options: &self.options,
            selections: &selections,
        };
        match self.policy.finish(view).await {
            Ok(()) => {}
            Err(SurfaceError::Unavailable) => {
                debug!(surface = %self.surface.id(), "surface gone before expiry render");
            }
            Err(err) => {
                warn!(surface = %self.surface.id(), %err, "expiry render failed");
            }
        }
        debug!(surface = %self.surface.id(), "menu expired");
    }

    /// Explicit removal: the timeout task is cancelled without running its
    /// callback and the surface is cleaned up best-effort.
    pub async fn delete(&self) {
        let Some((waiter, timeout)) = self.enter_terminal(MenuState::Deleted).await else {
            return;
        };
        self.remove_registry_entry().await;
        if let Some(task) = timeout {
            let _ = task.force_expire(false).await;
        }
        if let Some(waiter) = waiter {
            let _ = waiter.send(MenuOutcome::Cancelled);
        }
        if let Err(err) = self.surface.clear().await {
            debug!(surface = %self.surface.id(), %err, "surface cleanup failed");
        }
        debug!(surface = %self.surface.id(), "menu deleted");
    }

    /// Serialize for saving. The timeout is the absolute epoch instant, so
    /// rehydration after a restart expires at the original deadline.
    pub async fn to_record(&self) -> Result<MenuRecord, PersistError> {
        let Some(spec) = &self.persist else {
            return Err(PersistError::NotSaveable);
        };
        let cell = self.cell.lock().await;
        Ok(MenuRecord {
            surface: self.surface.id(),
            kind: spec.kind.clone(),
            options: spec.options.clone(),
            expires_at_epoch: cell.timeout_epoch,
            target: self.target,
            style: self.style.clone(),
        })
    }

    /// Resolution by a terminal activation: like expiry, but the surface is
    /// left as-is for the owner to repaint with the result.
    async fn resolve(&self, outcome: MenuOutcome) {
        let Some((waiter, timeout)) = self.enter_terminal(MenuState::Expired).await else {
            return;
        };
        self.remove_registry_entry().await;
        if let Some(task) = timeout {
            let _ = task.force_expire(false).await;
        }
        if let Some(waiter) = waiter {
            let _ = waiter.send(outcome);
        }
        debug!(surface = %self.surface.id(), "menu resolved");
    }

    /// Flip out of Active exactly once, handing back the waiter and the
    /// timeout task. None if already terminal.
    async fn enter_terminal(
        &self,
        state: MenuState,
    ) -> Option<(Option<oneshot::Sender<MenuOutcome>>, Option<TimedTask>)> {
        let mut cell = self.cell.lock().await;
        if cell.state != MenuState::Active {
            return None;
        }
        cell.state = state;
        Some((cell.waiter.take(), cell.timeout.take()))
    }

    async fn remove_registry_entry(&self) {
        let registry = { self.cell.lock().await.registry.clone() };
        if let Some(menus) = registry.and_then(|weak| weak.upgrade()) {
            menus.lock().await.remove(&self.surface.id());
        }
    }

    pub(crate) async fn attach_registry(&self, registry: Weak<MenuMap>) {
        self.cell.lock().await.registry = Some(registry);
    }

    pub(crate) async fn set_timeout(&self, task: TimedTask, epoch: u64) {
        let mut cell = self.cell.lock().await;
        cell.timeout = Some(task);
        cell.timeout_epoch = Some(epoch);
    }
}

pub struct MenuBuilder {
    surface: Arc<dyn Surface>,
    options: Vec<MenuOption>,
    target: Option<TargetPrincipal>,
    style: MenuStyle,
    policy: Box<dyn MenuPolicy>,
    persist: Option<PersistSpec>,
}

impl fmt::Debug for MenuBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MenuBuilder")
            .field("surface", &self.surface.id())
            .field("options", &self.options)
            .finish()
    }
}

impl MenuBuilder {
    pub fn option(mut self, option: MenuOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn options(mut self, options: impl IntoIterator<Item = MenuOption>) -> Self {
        self.options.extend(options);
        self
    }

    pub fn target(mut self, target: TargetPrincipal) -> Self {
        self.target = Some(target);
        self
    }

    pub fn maybe_target(mut self, target: Option<TargetPrincipal>) -> Self {
        self.target = target;
        self
    }

    pub fn style(mut self, style: MenuStyle) -> Self {
        self.style = style;
        self
    }

    pub fn policy(mut self, policy: impl MenuPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Mark the menu saveable, carrying the data its options are rebuilt
    /// from on rehydration.
    pub fn persist(mut self, spec: PersistSpec) -> Self {
        self.persist = Some(spec);
        self
    }

    pub fn build(self) -> Result<Menu, MenuError> {
        for (i, option) in self.options.iter().enumerate() {
            if self.options[..i]
                .iter()
                .any(|other| other.symbol() == option.symbol())
            {
                return Err(MenuError::DuplicateSymbol(option.symbol().clone()));
            }
        }
        let (waiter, outcome_rx) = oneshot::channel();
        Ok(Menu {
            surface: self.surface,
            options: self.options,
            target: self.target,
            style: self.style,
            policy: self.policy,
            persist: self.persist,
            cell: Mutex::new(MenuCell {
                state: MenuState::Active,
                selections: HashMap::new(),
                waiter: Some(waiter),
                timeout: None,
                timeout_epoch: None,
                registry: None,
            }),
            outcome_rx: Mutex::new(Some(outcome_rx)),
        })
    }
}
