//! Alert assembly and delivery.
//!
//! - [`AlertMessage`]: signal, confidence, suggested direction and CVD breakdown
//! - [`AlertSink`]: delivery seam, with [`WebhookSink`] for chat webhooks
//!   and [`MockAlertSink`] for tests

pub mod config;
pub mod error;
pub mod message;
pub mod sink;

pub use config::NotifyConfig;
pub use error::{NotifyError, NotifyResult};
pub use message::{suggested_direction, AlertMessage};
pub use sink::{AlertSink, BoxFuture, DeliveryResult, DynAlertSink, MockAlertSink, WebhookSink};
