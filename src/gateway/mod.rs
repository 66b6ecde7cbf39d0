//! Gateway server implementation

mod router;
mod server;

pub use router::{AppState, SendMessageRequest, ServiceResult, WebhookRequest, create_router};
pub use server::Gateway;
