pub mod bootstrap;
pub mod config;
pub mod error;
pub mod form;
mod handlers;
pub mod routes;
pub mod state;
