//! HTTP API: job status, per-user job listing, and queue stats.

pub mod app;
pub mod config;
