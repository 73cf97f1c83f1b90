pub mod ai;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod export;
pub mod history;
pub mod media;
pub mod pipeline;
pub mod profile;
pub mod scans;
pub mod state;
pub mod storage;
