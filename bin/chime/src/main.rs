use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::time::sleep;
use tracing::info;

use chime_core::{RandomWindow, Scheduler, SchedulingConfig, TimedTask, expire_fn};
use chime_menus::pickers::confirm::ConfirmMenu;
use chime_menus::{
    MenuExpiry, MenuRegistry, MenuStyle, MenuView, Participant, Surface, SurfaceError, SurfaceId,
    TriggerEvent, symbols,
};

use tracing_subscriber::{EnvFilter, fmt};

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Demo surface that draws menus into the log.
struct LogSurface {
    id: SurfaceId,
}

impl Surface for LogSurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn render(&self, view: MenuView) -> BoxFuture<'_, Result<(), SurfaceError>> {
        Box::pin(async move {
            info!(surface = %self.id, title = %view.style.title, "render");
            for line in &view.options {
                info!(surface = %self.id, "  {} {}", line.symbol, line.display_name);
            }
            Ok(())
        })
    }

    fn clear(&self) -> BoxFuture<'_, Result<(), SurfaceError>> {
        Box::pin(async move {
            info!(surface = %self.id, "clear");
            Ok(())
        })
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    info!("starting chime demo");

    let config = SchedulingConfig::default();
    config.validate().unwrap();

    // Periodic spawn-style task with a random delay window
    let spawns = Scheduler::new("spawns", &config);
    let window = RandomWindow::new(Duration::from_secs(2), Duration::from_secs(4)).unwrap();
    let task = TimedTask::builder()
        .delay_source(window)
        .auto_reschedule(true)
        .action(expire_fn(|| async {
            info!("encounter spawned");
            Ok(())
        }))
        .build()
        .unwrap();
    spawns.schedule_task(&task).await.unwrap();

    // Confirmation menu with an automatic timeout
    let registry = MenuRegistry::new(Scheduler::new("menus", &config));
    let surface = Arc::new(LogSurface { id: SurfaceId(1) });
    let menu = ConfirmMenu::build(
        surface,
        chime_menus::UserId(42),
        MenuStyle {
            title: "Duel challenge".to_string(),
            description: "Accept the challenge?".to_string(),
            ..MenuStyle::default()
        },
    )
    .unwrap();
    registry
        .register(menu.clone(), Some(MenuExpiry::After(Duration::from_secs(30))))
        .await
        .unwrap();
    menu.refresh().await.unwrap();

    let event = TriggerEvent::activate(symbols::accept(), Participant::user(42));
    let dispatch = registry.route_trigger(SurfaceId(1), &event).await.unwrap();
    info!(?dispatch, "trigger routed");
    let outcome = menu.outcome().await;
    info!(accepted = ?ConfirmMenu::accepted(&outcome), "menu resolved");

    // Let the periodic task fire a few times
    sleep(Duration::from_secs(10)).await;

    info!("shutting down");
    spawns.shutdown().await;
    registry.scheduler().shutdown().await;
}
