//! Local state: directory layout, settings and the run lease

pub mod layout;
pub mod lease;
pub mod settings;
