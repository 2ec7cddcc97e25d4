pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod services;
pub mod state;
pub mod workflow;

pub use state::AppState;
