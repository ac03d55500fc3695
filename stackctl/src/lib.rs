//! stackctl library
//!
//! Release orchestration for a two-environment container stack: deploy to
//! staging, promote to production behind a health gate and a confirmation,
//! roll back to a snapshot, and bootstrap a fresh host.

pub mod app;
pub mod audit;
pub mod authn;
pub mod confirm;
pub mod controllers;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod health;
pub mod images;
pub mod logs;
pub mod models;
pub mod orchestrator;
pub mod secrets;
pub mod storage;
pub mod utils;
