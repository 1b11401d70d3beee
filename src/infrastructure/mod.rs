pub mod auth;
pub mod balance;
pub mod cache;
pub mod config;
pub mod db;
pub mod state;
pub mod store;
