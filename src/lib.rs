//! Utilidades de migración y reparación entre la base SQLite de Progain y
//! su document store.

pub mod commands;
pub mod config;
pub mod confirm;
pub mod credentials;
pub mod error;
pub mod file_utils;
pub mod identifier_map;
pub mod logging;
pub mod models;
pub mod progress;
pub mod runner;
pub mod source;
pub mod store;
