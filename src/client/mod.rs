//! Relational source connections and credentials.
//!
//! This module provides the [`ConnectionProvider`] that opens a run-scoped
//! [`Connection`] to the source database, along with the [`Auth`] credentials
//! merged into the connection string.

mod auth;
mod connection;

pub use auth::Auth;
pub use connection::{Connection, ConnectionProvider};
