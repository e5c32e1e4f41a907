pub mod error;
pub mod notify;
pub mod roles;

pub use error::AppError;
pub use notify::{Notifier, NotifyError, NoopNotifier};
pub use roles::{CallerRole, RolePolicy};
