// Library exports for EMB
// This allows integration tests and the binary to share the same modules

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod flash;
pub mod images;
pub mod mail;
pub mod pagination;
pub mod routes;
pub mod sanitize;
pub mod state;
