//! Service health probing

pub mod prober;
pub mod readiness;
