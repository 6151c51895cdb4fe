//! Session orchestration.
//!
//! Owns the controller loop that ties user commands, request dispatch, and
//! status polling to the reconciler, keeping presentation layers as plain
//! event subscribers.

mod controller;
mod dispatcher;
mod poller;

pub(crate) use controller::{run_controller, Command};
