//! Action controllers: one linear run per command

pub mod deploy_staging;
pub mod promote;
pub mod report;
pub mod rollback;
pub mod spin_up;
