//! Data model shared by the controllers

pub mod deployment;
pub mod environment;
pub mod image;
pub mod rollback;
