//! Registrar server library
//!
//! Account registration, login, and rotating refresh tokens over HTTP.

pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
