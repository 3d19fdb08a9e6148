pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod likes;
pub mod logger;
pub mod model;
pub mod store;
pub mod time;
