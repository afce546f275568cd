use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::time::{advance, pause};

use chime_core::{CheckingMode, Scheduler, SchedulingConfig};
use chime_menus::pickers::confirm::ConfirmMenu;
use chime_menus::pickers::inventory::ItemPicker;
use chime_menus::pickers::poll::{PollMenu, tally_votes};
use chime_menus::pickers::region::RegionPicker;
use chime_menus::pickers::role::{RoleGrants, RolePicker};
use chime_menus::{
    Dispatch, MenuError, MenuExpiry, MenuOutcome, MenuRegistry, MenuState, MenuStyle, MenuView,
    Participant, RegistryError, RoleId, Surface, SurfaceError, SurfaceId, Symbol, TargetPrincipal,
    TriggerEvent, UserId, symbols,
};

struct TestSurface {
    id: SurfaceId,
    renders: Mutex<Vec<MenuView>>,
    cleared: AtomicBool,
    available: AtomicBool,
}

impl TestSurface {
    fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id: SurfaceId(id),
            renders: Mutex::new(Vec::new()),
            cleared: AtomicBool::new(false),
            available: AtomicBool::new(true),
        })
    }

    fn last_render(&self) -> Option<MenuView> {
        self.renders.lock().unwrap().last().cloned()
    }
}

impl Surface for TestSurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn render(&self, view: MenuView) -> BoxFuture<'_, Result<(), SurfaceError>> {
        Box::pin(async move {
            if !self.available.load(Ordering::SeqCst) {
                return Err(SurfaceError::Unavailable);
            }
            self.renders.lock().unwrap().push(view);
            Ok(())
        })
    }

    fn clear(&self) -> BoxFuture<'_, Result<(), SurfaceError>> {
        Box::pin(async move {
            self.cleared.store(true, Ordering::SeqCst);
            Ok(())
        })
    }
}

#[derive(Default)]
struct RecordingRoles {
    granted: Mutex<Vec<(u64, u64)>>,
    revoked: Mutex<Vec<(u64, u64)>>,
}

impl RoleGrants for RecordingRoles {
    fn grant(&self, user: UserId, role: RoleId) -> BoxFuture<'_, Result<(), MenuError>> {
        Box::pin(async move {
            self.granted.lock().unwrap().push((user.0, role.0));
            Ok(())
        })
    }

    fn revoke(&self, user: UserId, role: RoleId) -> BoxFuture<'_, Result<(), MenuError>> {
        Box::pin(async move {
            self.revoked.lock().unwrap().push((user.0, role.0));
            Ok(())
        })
    }
}

fn new_registry() -> MenuRegistry {
    let config = SchedulingConfig {
        checking: CheckingMode::Dynamic,
        lateness_threshold_secs: 10,
    };
    MenuRegistry::new(Scheduler::new("menus", &config))
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn role_picker_toggles_roles_for_permitted_holders() {
    let surface = TestSurface::new(1);
    let roles = Arc::new(RecordingRoles::default());
    let menu = RolePicker::build(
        surface.clone(),
        roles.clone(),
        vec![(symbols::number(1).unwrap(), "Blue".to_string(), RoleId(70))],
        Some(TargetPrincipal::Role(RoleId(9))),
        MenuStyle::default(),
    )
    .unwrap();

    let holder = Participant::with_roles(5, [9]);
    let on = TriggerEvent::activate(symbols::number(1).unwrap(), holder.clone());
    assert_eq!(menu.handle_trigger(&on).await.unwrap(), Dispatch::Handled);
    assert_eq!(*roles.granted.lock().unwrap(), vec![(5, 70)]);
    assert_eq!(
        menu.selections_for(UserId(5)).await,
        vec![symbols::number(1).unwrap()]
    );

    let off = TriggerEvent::deactivate(symbols::number(1).unwrap(), holder);
    assert_eq!(menu.handle_trigger(&off).await.unwrap(), Dispatch::Handled);
    assert_eq!(*roles.revoked.lock().unwrap(), vec![(5, 70)]);
    assert!(menu.selections_for(UserId(5)).await.is_empty());
}

#[tokio::test]
async fn non_target_triggers_are_silently_ignored() {
    let surface = TestSurface::new(1);
    let roles = Arc::new(RecordingRoles::default());
    let menu = RolePicker::build(
        surface,
        roles.clone(),
        vec![(symbols::number(1).unwrap(), "Blue".to_string(), RoleId(70))],
        Some(TargetPrincipal::Role(RoleId(9))),
        MenuStyle::default(),
    )
    .unwrap();

    // right symbol, wrong principal: no behavior, no state change
    let outsider = Participant::user(6);
    let event = TriggerEvent::activate(symbols::number(1).unwrap(), outsider);
    assert_eq!(menu.handle_trigger(&event).await.unwrap(), Dispatch::Ignored);
    assert!(roles.granted.lock().unwrap().is_empty());
    assert!(menu.selections_for(UserId(6)).await.is_empty());
    assert_eq!(menu.state().await, MenuState::Active);
}

#[tokio::test]
async fn confirm_menu_resolves_on_first_terminal_activation() {
    let registry = new_registry();
    let surface = TestSurface::new(2);
    let menu = ConfirmMenu::build(surface, UserId(42), MenuStyle::default()).unwrap();
    registry
        .register(menu.clone(), Some(MenuExpiry::After(Duration::from_secs(60))))
        .await
        .unwrap();

    let event = TriggerEvent::activate(symbols::accept(), Participant::user(42));
    let dispatch = registry.route_trigger(SurfaceId(2), &event).await.unwrap();
    assert_eq!(dispatch, Dispatch::Resolved(vec![symbols::accept()]));

    assert_eq!(menu.state().await, MenuState::Expired);
    assert!(registry.lookup(SurfaceId(2)).await.is_none());
    assert_eq!(ConfirmMenu::accepted(&menu.outcome().await), Some(true));

    // the timeout task was cancelled along with the resolution
    assert!(registry.scheduler().is_empty().await);

    registry.scheduler().shutdown().await;
}

#[tokio::test]
async fn timeout_expires_the_menu_and_repaints_the_surface() {
    pause();
    let registry = new_registry();
    let surface = TestSurface::new(3);
    let menu = ConfirmMenu::build(surface.clone(), UserId(42), MenuStyle::default()).unwrap();
    registry
        .register(menu.clone(), Some(MenuExpiry::After(Duration::from_secs(5))))
        .await
        .unwrap();

    advance(Duration::from_secs(5)).await;
    settle().await;

    assert_eq!(menu.state().await, MenuState::Expired);
    assert!(registry.lookup(SurfaceId(3)).await.is_none());
    assert_eq!(menu.outcome().await, MenuOutcome::TimedOut);
    let repaint = surface.last_render().expect("expiry repaint");
    assert!(!repaint.style.footer.is_empty());

    // expired menus ignore further triggers
    let event = TriggerEvent::activate(symbols::accept(), Participant::user(42));
    assert_eq!(menu.handle_trigger(&event).await.unwrap(), Dispatch::Ignored);

    registry.scheduler().shutdown().await;
}

#[tokio::test]
async fn delete_cancels_the_timeout_without_running_it() {
    pause();
    let registry = new_registry();
    let surface = TestSurface::new(4);
    let menu = ConfirmMenu::build(surface.clone(), UserId(42), MenuStyle::default()).unwrap();
    registry
        .register(menu.clone(), Some(MenuExpiry::After(Duration::from_secs(5))))
        .await
        .unwrap();
    let timeout = menu.timeout_task().await.expect("timeout task");

    assert!(registry.delete_menu(SurfaceId(4)).await);
    assert_eq!(menu.state().await, MenuState::Deleted);
    assert!(timeout.is_completed());
    assert!(surface.cleared.load(Ordering::SeqCst));
    assert_eq!(menu.outcome().await, MenuOutcome::Cancelled);

    // the cancelled timeout never fires its expiry repaint
    advance(Duration::from_secs(30)).await;
    settle().await;
    assert!(surface.renders.lock().unwrap().is_empty());

    registry.scheduler().shutdown().await;
}

#[tokio::test]
async fn one_live_menu_per_surface() {
    let registry = new_registry();
    let first = ConfirmMenu::build(TestSurface::new(5), UserId(1), MenuStyle::default()).unwrap();
    let second = ConfirmMenu::build(TestSurface::new(5), UserId(2), MenuStyle::default()).unwrap();

    registry.register(first, None).await.unwrap();
    assert!(matches!(
        registry.register(second, None).await,
        Err(RegistryError::Occupied(SurfaceId(5)))
    ));

    registry.scheduler().shutdown().await;
}

#[tokio::test]
async fn unknown_surfaces_are_ignored() {
    let registry = new_registry();
    let event = TriggerEvent::activate(symbols::accept(), Participant::user(1));
    assert_eq!(
        registry.route_trigger(SurfaceId(99), &event).await.unwrap(),
        Dispatch::Ignored
    );
    registry.scheduler().shutdown().await;
}

#[tokio::test]
async fn single_choice_poll_counts_each_users_first_vote() {
    let red = Symbol::unicode("\u{1f534}");
    let blue = Symbol::unicode("\u{1f535}");

    let registry = new_registry();
    let surface = TestSurface::new(6);
    let menu = PollMenu::build(
        surface.clone(),
        vec![(red.clone(), "Red".to_string()), (blue.clone(), "Blue".to_string())],
        false,
        None,
        MenuStyle::default(),
    )
    .unwrap();
    registry.register(menu.clone(), None).await.unwrap();

    for (user, symbol) in [(1, &red), (2, &red), (2, &blue)] {
        let event = TriggerEvent::activate(symbol.clone(), Participant::user(user));
        registry.route_trigger(SurfaceId(6), &event).await.unwrap();
    }

    let log: HashMap<UserId, Vec<Symbol>> = [
        (UserId(1), vec![red.clone()]),
        (UserId(2), vec![red.clone(), blue.clone()]),
    ]
    .into_iter()
    .collect();
    assert_eq!(tally_votes(&log, &[red.clone(), blue.clone()], false), vec![2, 0]);
    assert_eq!(tally_votes(&log, &[red.clone(), blue.clone()], true), vec![2, 1]);

    assert!(registry.expire_menu(SurfaceId(6)).await);
    let repaint = surface.last_render().expect("results repaint");
    let results = &repaint.fields[0];
    assert_eq!(results.name, "Results");
    assert!(results.value.contains("Red"));
    assert!(results.value.contains("2 votes"));

    registry.scheduler().shutdown().await;
}

#[tokio::test]
async fn region_picker_resolves_the_chosen_layer_set() {
    let owner = UserId(9);
    let layers = [1u8, 2, 3];
    let surface = TestSurface::new(7);
    let menu = RegionPicker::build(surface, owner, &layers, MenuStyle::default()).unwrap();

    let participant = Participant::user(9);
    for layer in [1usize, 3] {
        let event = TriggerEvent::activate(symbols::number(layer).unwrap(), participant.clone());
        assert_eq!(menu.handle_trigger(&event).await.unwrap(), Dispatch::Handled);
    }
    let submit = TriggerEvent::activate(symbols::submit(), participant);
    assert!(matches!(
        menu.handle_trigger(&submit).await.unwrap(),
        Dispatch::Resolved(_)
    ));

    let outcome = menu.outcome().await;
    assert_eq!(RegionPicker::chosen_regions(&outcome, &layers), Some(vec![1, 3]));
}

#[tokio::test]
async fn region_picker_select_all_and_cancel_short_circuit() {
    let layers = [1u8, 2];

    let menu =
        RegionPicker::build(TestSurface::new(8), UserId(9), &layers, MenuStyle::default()).unwrap();
    let event = TriggerEvent::activate(symbols::select_all(), Participant::user(9));
    menu.handle_trigger(&event).await.unwrap();
    assert_eq!(
        RegionPicker::chosen_regions(&menu.outcome().await, &layers),
        Some(vec![1, 2])
    );

    let menu =
        RegionPicker::build(TestSurface::new(9), UserId(9), &layers, MenuStyle::default()).unwrap();
    let event = TriggerEvent::activate(symbols::cancel(), Participant::user(9));
    menu.handle_trigger(&event).await.unwrap();
    assert_eq!(
        RegionPicker::chosen_regions(&menu.outcome().await, &layers),
        Some(Vec::new())
    );
}

#[tokio::test]
async fn item_picker_resolves_the_picked_index() {
    let surface = TestSurface::new(10);
    let menu = ItemPicker::build(
        surface,
        vec!["Laser".to_string(), "Shield".to_string()],
        None,
        MenuStyle::default(),
    )
    .unwrap();

    let event = TriggerEvent::activate(symbols::number(1).unwrap(), Participant::user(3));
    assert!(matches!(
        menu.handle_trigger(&event).await.unwrap(),
        Dispatch::Resolved(_)
    ));
    assert_eq!(ItemPicker::picked_index(&menu.outcome().await), Some(1));
}

#[tokio::test]
async fn item_picker_caps_the_page_size() {
    let names = (0..20).map(|n| format!("Item {n}")).collect();
    let built = ItemPicker::build(TestSurface::new(11), names, None, MenuStyle::default());
    assert!(matches!(built, Err(MenuError::TooManyOptions { .. })));
}

#[tokio::test]
async fn losing_the_surface_at_expiry_is_not_fatal() {
    let registry = new_registry();
    let surface = TestSurface::new(12);
    surface.available.store(false, Ordering::SeqCst);
    let menu = ConfirmMenu::build(surface.clone(), UserId(1), MenuStyle::default()).unwrap();
    registry.register(menu.clone(), None).await.unwrap();

    assert!(registry.expire_menu(SurfaceId(12)).await);
    assert_eq!(menu.state().await, MenuState::Expired);
    assert!(surface.renders.lock().unwrap().is_empty());

    registry.scheduler().shutdown().await;
}
