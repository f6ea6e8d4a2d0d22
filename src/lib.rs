pub mod browse;
pub mod cache;
pub mod catalog;
pub mod error;
pub mod session;
