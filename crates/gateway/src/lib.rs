//! `pl-gateway`: the PairLink server and CLI.
//!
//! - [`runtime`]: the pairing state machine and session supervisor
//! - [`api`]: HTTP surface (`/code`, `/health`, `/v1/sessions`)
//! - [`bootstrap`]: wiring of config, transport and archive store
//! - [`cli`]: command-line parsing and one-shot commands

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod runtime;
pub mod state;
