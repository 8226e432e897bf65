//! Asynchronous job pipeline
//!
//! Callers submit named jobs over HTTP; the submission gateway records each
//! job durably and publishes it to an at-least-once work queue. A pool of
//! workers produces an artifact per job and performs an idempotent
//! PENDING -> COMPLETE transition. The query path reconstructs job state and
//! signs short-lived links to finished artifacts.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
