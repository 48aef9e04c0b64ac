//! `pl-domain`: shared configuration, error and trace types used across
//! every PairLink crate.

pub mod config;
pub mod error;
pub mod trace;

pub use error::{Error, Result};
