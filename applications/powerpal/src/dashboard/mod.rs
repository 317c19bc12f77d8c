//! Per-view dashboard state: session guard, live device list and the edit controller.

pub mod controller;
pub mod guard;
pub mod session;
pub mod subscriber;

pub use controller::{write_loads, ControllerError, EditController, EditState, PendingWrite, WriteKind};
pub use guard::{GuardDecision, SessionGuard, LOGIN_ROUTE};
pub use session::{Activation, DashboardSession, SessionEvent};
pub use subscriber::{extract_loads, ListUpdate, LiveListSubscriber};
