use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::time::{advance, pause};

use chime_core::{CheckingMode, Scheduler, SchedulingConfig};
use chime_menus::pickers::confirm::ConfirmMenu;
use chime_menus::pickers::role::{RoleGrants, RolePicker};
use chime_menus::{
    Dispatch, MenuError, MenuExpiry, MenuKind, MenuRegistry, MenuState, MenuStyle, MenuView,
    Participant, PersistError, RoleId, Surface, SurfaceError, SurfaceId, SurfaceResolver,
    TargetPrincipal, TriggerEvent, UserId, epoch_now, load_records, remaining_delay, save_records,
    symbols,
};

struct TestSurface {
    id: SurfaceId,
    renders: Mutex<Vec<MenuView>>,
    available: AtomicBool,
}

impl TestSurface {
    fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id: SurfaceId(id),
            renders: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
        })
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
        Box::pin(async move { Ok(()) })
    }
}

#[derive(Default)]
struct RecordingRoles {
    granted: Mutex<Vec<(u64, u64)>>,
}

impl RoleGrants for RecordingRoles {
    fn grant(&self, user: UserId, role: RoleId) -> BoxFuture<'_, Result<(), MenuError>> {
        Box::pin(async move {
            self.granted.lock().unwrap().push((user.0, role.0));
            Ok(())
        })
    }

    fn revoke(&self, _user: UserId, _role: RoleId) -> BoxFuture<'_, Result<(), MenuError>> {
        Box::pin(async move { Ok(()) })
    }
}

#[derive(Default)]
struct MapResolver {
    surfaces: HashMap<SurfaceId, Arc<dyn Surface>>,
}

impl SurfaceResolver for MapResolver {
    fn resolve(&self, id: SurfaceId) -> Option<Arc<dyn Surface>> {
        self.surfaces.get(&id).cloned()
    }
}

fn new_registry() -> MenuRegistry {
    let config = SchedulingConfig {
        checking: CheckingMode::Dynamic,
        lateness_threshold_secs: 10,
    };
    MenuRegistry::new(Scheduler::new("menus", &config))
}

fn role_picker_entries() -> Vec<(chime_menus::Symbol, String, RoleId)> {
    vec![
        (symbols::number(1).unwrap(), "Blue".to_string(), RoleId(70)),
        (symbols::number(2).unwrap(), "Red".to_string(), RoleId(71)),
    ]
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[test]
fn remaining_delay_is_clamped_at_zero() {
    assert_eq!(remaining_delay(100, 95), Duration::from_secs(5));
    assert_eq!(remaining_delay(100, 100), Duration::ZERO);
    assert_eq!(remaining_delay(100, 120), Duration::ZERO);
}

#[tokio::test]
async fn saveable_menu_round_trips_through_json() {
    let registry = new_registry();
    let surface = TestSurface::new(1);
    let roles = Arc::new(RecordingRoles::default());
    let menu = RolePicker::build(
        surface,
        roles,
        role_picker_entries(),
        Some(TargetPrincipal::Role(RoleId(9))),
        MenuStyle::default(),
    )
    .unwrap();

    let deadline = epoch_now() + 300;
    registry
        .register(menu.clone(), Some(MenuExpiry::AtEpoch(deadline)))
        .await
        .unwrap();

    let record = menu.to_record().await.unwrap();
    assert_eq!(record.surface, SurfaceId(1));
    assert_eq!(record.kind, MenuKind::RolePicker);
    assert_eq!(record.expires_at_epoch, Some(deadline));
    assert_eq!(record.options.len(), 2);

    let json = serde_json::to_string(&record).unwrap();
    let parsed: chime_menus::MenuRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, record);

    registry.scheduler().shutdown().await;
}

#[tokio::test]
async fn unsaveable_menus_refuse_serialization() {
    let registry = new_registry();
    let confirm = ConfirmMenu::build(TestSurface::new(2), UserId(1), MenuStyle::default()).unwrap();
    registry.register(confirm.clone(), None).await.unwrap();

    assert!(!confirm.saveable());
    assert!(matches!(
        confirm.to_record().await,
        Err(PersistError::NotSaveable)
    ));

    // snapshots silently carry only the saveable menus
    assert!(registry.snapshot().await.is_empty());

    registry.scheduler().shutdown().await;
}

#[tokio::test]
async fn restore_expires_at_the_original_absolute_deadline() {
    pause();
    let registry = new_registry();
    let surface = TestSurface::new(3);
    let roles = Arc::new(RecordingRoles::default());

    // persisted before "the restart" with a little time left on the clock;
    // the saved absolute instant wins over any original delta
    let record = {
        let menu = RolePicker::build(
            surface.clone(),
            roles.clone(),
            role_picker_entries(),
            None,
            MenuStyle::default(),
        )
        .unwrap();
        let staging = new_registry();
        staging
            .register(menu.clone(), Some(MenuExpiry::AtEpoch(epoch_now() + 3)))
            .await
            .unwrap();
        let record = menu.to_record().await.unwrap();
        staging.scheduler().shutdown().await;
        record
    };

    let mut resolver = MapResolver::default();
    resolver.surfaces.insert(SurfaceId(3), surface.clone());
    let restored = registry
        .restore(vec![record], &resolver, roles)
        .await
        .unwrap();
    assert_eq!(restored, 1);

    advance(Duration::from_secs(1)).await;
    settle().await;
    let menu = registry.lookup(SurfaceId(3)).await.expect("menu is live");
    assert_eq!(menu.state().await, MenuState::Active);

    advance(Duration::from_secs(3)).await;
    settle().await;
    assert!(registry.lookup(SurfaceId(3)).await.is_none());
    assert_eq!(menu.state().await, MenuState::Expired);

    registry.scheduler().shutdown().await;
}

#[tokio::test]
async fn restore_skips_records_whose_surface_is_gone() {
    let registry = new_registry();
    let surface = TestSurface::new(4);
    let roles = Arc::new(RecordingRoles::default());
    let menu = RolePicker::build(
        surface,
        roles.clone(),
        role_picker_entries(),
        None,
        MenuStyle::default(),
    )
    .unwrap();
    registry.register(menu.clone(), None).await.unwrap();
    let records = registry.snapshot().await;
    assert_eq!(records.len(), 1);

    let fresh = new_registry();
    let restored = fresh
        .restore(records, &MapResolver::default(), roles)
        .await
        .unwrap();
    assert_eq!(restored, 0);
    assert!(fresh.is_empty().await);

    registry.scheduler().shutdown().await;
    fresh.scheduler().shutdown().await;
}

#[tokio::test]
async fn snapshot_survives_the_disk() {
    let registry = new_registry();
    let surface = TestSurface::new(6);
    let roles = Arc::new(RecordingRoles::default());
    let menu = RolePicker::build(
        surface,
        roles,
        role_picker_entries(),
        None,
        MenuStyle::default(),
    )
    .unwrap();
    registry.register(menu, None).await.unwrap();

    let path = std::env::temp_dir().join("chime-menus-snapshot-test.json");
    let records = registry.snapshot().await;
    save_records(&path, &records).unwrap();
    let loaded = load_records(&path).unwrap();
    assert_eq!(loaded, records);
    std::fs::remove_file(&path).ok();

    registry.scheduler().shutdown().await;
}

#[tokio::test]
async fn restored_role_picker_keeps_working() {
    let registry = new_registry();
    let surface = TestSurface::new(5);
    let roles = Arc::new(RecordingRoles::default());
    let menu = RolePicker::build(
        surface.clone(),
        roles.clone(),
        role_picker_entries(),
        None,
        MenuStyle::default(),
    )
    .unwrap();
    registry.register(menu, None).await.unwrap();
    let records = registry.snapshot().await;
    registry.scheduler().shutdown().await;

    let fresh = new_registry();
    let mut resolver = MapResolver::default();
    resolver.surfaces.insert(SurfaceId(5), surface);
    assert_eq!(
        fresh.restore(records, &resolver, roles.clone()).await.unwrap(),
        1
    );

    let event = TriggerEvent::activate(symbols::number(2).unwrap(), Participant::user(8));
    let dispatch = fresh.route_trigger(SurfaceId(5), &event).await.unwrap();
    assert_eq!(dispatch, Dispatch::Handled);
    assert_eq!(*roles.granted.lock().unwrap(), vec![(8, 71)]);

    fresh.scheduler().shutdown().await;
}
