//! Notification layer: SMTP transport and stakeholder dispatch.
//!
//! Delivery is best-effort end to end: a failure to reach one recipient
//! is logged and never blocks the remaining recipients, and a
//! notification failure never blocks event persistence or the
//! mark-broken write.

pub mod dispatcher;
pub mod email;

pub use dispatcher::NotificationDispatcher;
pub use email::EmailSender;
