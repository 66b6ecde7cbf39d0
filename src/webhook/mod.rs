//! Webhook registry and event fanout

mod dispatcher;
mod registry;

pub use dispatcher::WebhookDispatcher;
pub use registry::{WebhookEndpoint, WebhookRegistry};
