//! Operator notifications for failed jobs

mod models;
mod service;

pub use models::Email;
pub use service::{AlertNotifier, LogMailer, Mailer};

#[cfg(any(test, feature = "mock"))]
pub use service::MockMailer;
