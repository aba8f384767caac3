//! E2E test scenarios.

mod config_error;
mod daemon_loop;
mod one_shot;
