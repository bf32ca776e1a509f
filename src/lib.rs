pub mod config;
pub mod error;
pub mod gateway;
pub mod registry;
pub mod roles;
pub mod room;
pub mod types;
pub mod vote;
