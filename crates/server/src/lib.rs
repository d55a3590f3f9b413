pub mod api;
pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod provider;
pub mod state;
