//! Deployment primitives

pub mod executor;
pub mod fsm;
