//! Contact-form backend: validated submissions stored through a lazily
//! constructed, retrying database client, plus a URL safety check for
//! untrusted links.

pub mod config;
pub mod db;
pub mod errors;
pub mod logging;
pub mod models;
pub mod routes;
pub mod schema;
pub mod security;
