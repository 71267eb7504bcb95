//! I/O helpers: settings, stores, operator console, executor handoff.

pub mod catalog_store;
pub mod config;
pub mod document_store;
pub mod env_store;
pub mod executor;
pub mod handoff;
pub mod init;
pub mod process;
pub mod prompt;
pub mod sources;
