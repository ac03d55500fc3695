//! Image tag management

pub mod tags;
