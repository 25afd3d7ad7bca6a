//! rmcp server wiring for the tool handlers.

pub mod service;

pub use service::DbService;
