pub mod config;
pub mod engine;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod task_context;
