//! Tributary Quota: per-project admission control
//!
//! Decides, for a set of projects and a billable product, which projects have
//! exceeded their plan. Decisions come from the shared cache when present and
//! are computed from workspace usage otherwise; crossing a usage threshold
//! triggers a detached notification.

pub mod controller;
pub mod notify;

pub use controller::{QuotaController, QuotaDecisions};
pub use notify::NotificationDispatcher;
