//! Operator credentials

pub mod keypair;
