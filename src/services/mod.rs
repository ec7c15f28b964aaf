pub mod key_mapper;
pub mod orchestrator;
pub mod queue_consumer;
pub mod transfer_service;
