pub mod health_handlers;
pub mod trigger_handlers;
