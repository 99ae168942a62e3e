pub mod chat_task;
pub mod engagement_task;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

// Re-export the handlers the binary wires into the router.
pub use rest::{chat_messages_handler, contextual_response_handler, list_chats_handler};
pub use ws_handler::ws_handler;
