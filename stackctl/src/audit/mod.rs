//! Deployment audit trail

pub mod log;
