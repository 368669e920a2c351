pub mod checkpoint;
pub mod config;
pub mod fetch_error;
pub mod fetcher;
pub mod importers;
pub mod pipeline;
pub mod report;
pub mod services;
pub mod sheets;
pub mod utils;
