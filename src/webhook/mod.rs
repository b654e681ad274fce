//! Inbound gateway notifications: authenticity check and payload parsing.

pub mod notification;
pub mod signature;

pub use notification::{NotificationError, WebhookNotification};
pub use signature::{sign, verify_signature, SIGNATURE_HEADER};
