//! Product catalog with asynchronous spreadsheet stock import

pub mod api;
pub mod app;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod import;
