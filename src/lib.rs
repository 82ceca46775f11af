pub mod agent;
pub mod auth;
pub mod checks;
pub mod cli;
pub mod config;
pub mod core;
pub mod exit;
pub mod logs;
pub mod platform;
pub mod portal;
pub mod remediations;
pub mod reporter;
pub mod scheduler;
pub mod store;
pub mod ui;
