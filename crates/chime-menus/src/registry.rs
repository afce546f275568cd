use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use chime_core::{Expire, ExpiryError, ScheduleError, Scheduler, TaskBuildError, TimedTask};

use crate::menu::{Dispatch, Menu, MenuError, TriggerEvent};
use crate::persist::{
    MenuKind, MenuRecord, PersistError, SurfaceResolver, epoch_now, remaining_delay,
};
use crate::pickers::poll::PollMenu;
use crate::pickers::role::{RoleGrants, RolePicker};
use crate::surface::SurfaceId;

pub(crate) type MenuMap = Mutex<HashMap<SurfaceId, Arc<Menu>>>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("surface {0} already has a live menu")]
    Occupied(SurfaceId),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Task(#[from] TaskBuildError),
}

/// When a registered menu should expire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuExpiry {
    After(Duration),
    /// Absolute instant in epoch seconds; what rehydration uses.
    AtEpoch(u64),
}

/// Expiry action scheduled for a registered menu: look the menu up by
/// surface id and run its timeout transition.
struct MenuTimeout {
    menus: Weak<MenuMap>,
    surface: SurfaceId,
}

impl Expire for MenuTimeout {
    fn on_expire(&self) -> BoxFuture<'_, Result<(), ExpiryError>> {
        Box::pin(async move {
            let Some(menus) = self.menus.upgrade() else {
                return Ok(());
            };
            let menu = { menus.lock().await.remove(&self.surface) };
            if let Some(menu) = menu {
                menu.expire().await;
            }
            Ok(())
        })
    }
}

/// Process-wide lookup from surface identity to live menu, plus the timing
/// glue that expires menus automatically.
///
/// Holds its task-category scheduler by value; collaborators receive a
/// registry handle instead of reaching for globals.
#[derive(Clone)]
pub struct MenuRegistry {
    menus: Arc<MenuMap>,
    scheduler: Scheduler,
}

impl MenuRegistry {
    pub fn new(scheduler: Scheduler) -> Self {
        info!(category = scheduler.category(), "initializing menu registry");
        Self {
            menus: Arc::new(Mutex::new(HashMap::new())),
            scheduler,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Insert a menu and, when an expiry is given, schedule its timeout
    /// task. At most one live menu per surface.
    pub async fn register(
        &self,
        menu: Arc<Menu>,
        expiry: Option<MenuExpiry>,
    ) -> Result<(), RegistryError> {
        let id = menu.surface_id();
        {
            let mut menus = self.menus.lock().await;
            if menus.contains_key(&id) {
                return Err(RegistryError::Occupied(id));
            }
            menus.insert(id, menu.clone());
        }
        menu.attach_registry(Arc::downgrade(&self.menus)).await;

        if let Some(expiry) = expiry {
            let (delay, epoch) = match expiry {
                MenuExpiry::After(delay) => (delay, epoch_now() + delay.as_secs()),
                MenuExpiry::AtEpoch(epoch) => (remaining_delay(epoch, epoch_now()), epoch),
            };
            if let Err(err) = self.schedule_timeout(&menu, id, delay, epoch).await {
                self.menus.lock().await.remove(&id);
                return Err(err);
            }
        }
        debug!(surface = %id, "menu registered");
        Ok(())
    }

    async fn schedule_timeout(
        &self,
        menu: &Arc<Menu>,
        surface: SurfaceId,
        delay: Duration,
        epoch: u64,
    ) -> Result<(), RegistryError> {
        let task = TimedTask::builder()
            .expire_after(delay)
            .action(MenuTimeout {
                menus: Arc::downgrade(&self.menus),
                surface,
            })
            .build()?;
        self.scheduler.schedule_task(&task).await?;
        menu.set_timeout(task, epoch).await;
        Ok(())
    }

    pub async fn lookup(&self, surface: SurfaceId) -> Option<Arc<Menu>> {
        self.menus.lock().await.get(&surface).cloned()
    }

    /// Bare removal without a state transition; the caller owns whatever
    /// happens to the menu next.
    pub async fn unregister(&self, surface: SurfaceId) -> Option<Arc<Menu>> {
        self.menus.lock().await.remove(&surface)
    }

    /// Explicit-removal entry point: Deleted transition, timeout cancelled
    /// without its callback.
    pub async fn delete_menu(&self, surface: SurfaceId) -> bool {
        let menu = { self.menus.lock().await.remove(&surface) };
        match menu {
            Some(menu) => {
                menu.delete().await;
                true
            }
            None => false,
        }
    }

    /// Timeout entry point, also usable to force a menu to expire early.
    pub async fn expire_menu(&self, surface: SurfaceId) -> bool {
        let menu = { self.menus.lock().await.remove(&surface) };
        match menu {
            Some(menu) => {
                menu.expire().await;
                true
            }
            None => false,
        }
    }

    /// Route one inbound trigger event. Unknown surfaces are ignored;
    /// dispatch errors propagate to the event-ingestion caller.
    pub async fn route_trigger(
        &self,
        surface: SurfaceId,
        event: &TriggerEvent,
    ) -> Result<Dispatch, MenuError> {
        let menu = { self.menus.lock().await.get(&surface).cloned() };
        match menu {
            Some(menu) => menu.handle_trigger(event).await,
            None => Ok(Dispatch::Ignored),
        }
    }

    pub async fn len(&self) -> usize {
        self.menus.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Records for every live saveable menu.
    pub async fn snapshot(&self) -> Vec<MenuRecord> {
        let menus: Vec<Arc<Menu>> = { self.menus.lock().await.values().cloned().collect() };
        let mut records = Vec::new();
        for menu in menus {
            if !menu.saveable() {
                continue;
            }
            match menu.to_record().await {
                Ok(record) => records.push(record),
                Err(err) => {
                    warn!(surface = %menu.surface_id(), %err, "skipping unsaveable menu")
                }
            }
        }
        records
    }

    /// Rebuild menus from persisted records, re-registering each with its
    /// saved absolute expiry. Records whose surface is gone are skipped
    /// with a warning; returns the number restored.
    pub async fn restore(
        &self,
        records: Vec<MenuRecord>,
        surfaces: &dyn SurfaceResolver,
        roles: Arc<dyn RoleGrants>,
    ) -> Result<usize, PersistError> {
        let mut restored = 0;
        for record in records {
            let Some(surface) = surfaces.resolve(record.surface) else {
                warn!(surface = %record.surface, "persisted menu surface is gone, dropping record");
                continue;
            };
            let menu = match record.kind {
                MenuKind::RolePicker => RolePicker::from_record(&record, surface, roles.clone())?,
                MenuKind::Poll { .. } => PollMenu::from_record(&record, surface)?,
            };
            let expiry = record.expires_at_epoch.map(MenuExpiry::AtEpoch);
            if let Err(err) = self.register(menu, expiry).await {
                warn!(surface = %record.surface, %err, "failed to re-register persisted menu");
                continue;
            }
            restored += 1;
        }
        info!(restored, "menu registry rehydrated");
        Ok(restored)
    }
}
