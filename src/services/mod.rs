pub mod notification;
pub mod reconciler;
pub mod status_mapper;

pub use notification::{NotificationQueue, PlatformFunctionNotifier};
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use status_mapper::StatusMapper;
