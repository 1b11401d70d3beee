pub mod approval_flow;
pub mod catalog;
pub mod models;
pub mod permissions;
pub mod resolver;
