//! Reaction-driven interactive menus on top of the `chime-core` scheduler.
//!
//! A [`Menu`] is a set of symbol-bound options attached to an external
//! surface, optionally restricted to one principal and optionally expired
//! by a timed task. The [`MenuRegistry`] routes inbound trigger events to
//! the right menu and persists the saveable ones across restarts.

pub mod menu;
pub mod option;
pub mod persist;
pub mod pickers;
pub mod registry;
pub mod surface;

pub use menu::{
    Dispatch, FinishView, Menu, MenuBuilder, MenuError, MenuOutcome, MenuPolicy, MenuState,
    Participant, RoleId, SingleChoice, TargetPrincipal, ToggleUntilTimeout, TriggerAction,
    TriggerEvent, UserId,
};
pub use option::{InertBehavior, MenuOption, OptionBehavior, Symbol, TriggerCtx, symbols};
pub use persist::{
    MenuKind, MenuRecord, OptionRecord, PersistError, PersistSpec, SurfaceResolver, epoch_now,
    load_records, remaining_delay, save_records,
};
pub use registry::{MenuExpiry, MenuRegistry, RegistryError};
pub use surface::{MenuStyle, MenuView, OptionLine, Surface, SurfaceError, SurfaceId, ViewField};
