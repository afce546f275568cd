use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::debug;

use crate::menu::{
    FinishView, Menu, MenuError, MenuPolicy, RoleId, TargetPrincipal, UserId, render_finished,
};
use crate::option::{MenuOption, OptionBehavior, Symbol, TriggerCtx};
use crate::persist::{MenuKind, MenuRecord, OptionRecord, PersistError, PersistSpec};
use crate::surface::{MenuStyle, Surface, SurfaceError};

/// Grants and revokes member roles; the collaborator behind role-picker
/// options.
pub trait RoleGrants: Send + Sync {
    fn grant(&self, user: UserId, role: RoleId) -> BoxFuture<'_, Result<(), MenuError>>;

    fn revoke(&self, user: UserId, role: RoleId) -> BoxFuture<'_, Result<(), MenuError>>;
}

/// One role-picker entry: activation grants, deactivation revokes.
struct RoleToggle {
    roles: Arc<dyn RoleGrants>,
    role: RoleId,
}

impl OptionBehavior for RoleToggle {
    fn on_activate<'a>(&'a self, ctx: &'a TriggerCtx) -> BoxFuture<'a, Result<(), MenuError>> {
        Box::pin(async move {
            debug!(user = ctx.participant.user.0, role = self.role.0, "granting role");
            self.roles.grant(ctx.participant.user, self.role).await
        })
    }

    fn on_deactivate<'a>(&'a self, ctx: &'a TriggerCtx) -> BoxFuture<'a, Result<(), MenuError>> {
        Box::pin(async move {
            debug!(user = ctx.participant.user.0, role = self.role.0, "revoking role");
            self.roles.revoke(ctx.participant.user, self.role).await
        })
    }
}

const EXPIRED_ROLE_MENU: &str = "\u{1f634} This role menu has now expired.";

struct RolePickerPolicy;

impl MenuPolicy for RolePickerPolicy {
    fn finish<'a>(&'a self, view: FinishView<'a>) -> BoxFuture<'a, Result<(), SurfaceError>> {
        Box::pin(render_finished(view, EXPIRED_ROLE_MENU))
    }
}

/// Saveable toggle menu granting a role per option; runs until timeout or
/// explicit deletion.
#[derive(Debug)]
pub struct RolePicker;

impl RolePicker {
    pub fn build(
        surface: Arc<dyn Surface>,
        roles: Arc<dyn RoleGrants>,
        entries: Vec<(Symbol, String, RoleId)>,
        target: Option<TargetPrincipal>,
        mut style: MenuStyle,
    ) -> Result<Arc<Menu>, MenuError> {
        let mut options = Vec::with_capacity(entries.len());
        let mut records = BTreeMap::new();
        for (symbol, display_name, role) in entries {
            records.insert(
                symbol.sendable(),
                OptionRecord {
                    display_name: display_name.clone(),
                    role: Some(role.0),
                },
            );
            options.push(MenuOption::new(
                symbol,
                display_name,
                Box::new(RoleToggle {
                    roles: roles.clone(),
                    role,
                }),
            ));
        }

        if style.title.is_empty() {
            style.title = "Role Menu".to_string();
        }
        if style.description.is_empty() {
            style.description = "React for your desired role!".to_string();
        }

        let menu = Menu::builder(surface)
            .options(options)
            .policy(RolePickerPolicy)
            .maybe_target(target)
            .style(style)
            .persist(PersistSpec {
                kind: MenuKind::RolePicker,
                options: records,
            })
            .build()?;
        Ok(Arc::new(menu))
    }

    pub fn from_record(
        record: &MenuRecord,
        surface: Arc<dyn Surface>,
        roles: Arc<dyn RoleGrants>,
    ) -> Result<Arc<Menu>, PersistError> {
        let mut entries = Vec::with_capacity(record.options.len());
        for (symbol, option) in &record.options {
            let role = option.role.ok_or_else(|| {
                PersistError::Malformed(format!("role picker option {symbol} has no role"))
            })?;
            entries.push((
                Symbol::parse(symbol),
                option.display_name.clone(),
                RoleId(role),
            ));
        }
        Self::build(surface, roles, entries, record.target, record.style.clone())
            .map_err(|err| PersistError::Malformed(err.to_string()))
    }
}
