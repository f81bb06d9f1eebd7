//! Signed bearer tokens over a schema-driven credential store.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod schema;
pub mod service;
pub mod state;
pub mod store;
pub mod token;

pub use error::{ConfigError, SchemaError, StoreError, TokenError};
pub use service::AuthService;
