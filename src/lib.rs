pub mod api;
pub mod config;
pub mod errors;
pub mod logs;
pub mod orchestrator;
pub mod ports;
pub mod project;
pub mod runner;
pub mod server;
pub mod ws;
