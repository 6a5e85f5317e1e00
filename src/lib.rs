pub mod booking;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod file_source;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod reviews;
pub mod session;
pub mod source;
pub mod store;
pub mod watcher;
