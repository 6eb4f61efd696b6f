pub mod api;
pub mod app;
pub mod audio;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod global;
pub mod platform;
pub mod session;
