//! E2E integration tests for killfeed-daemon.
//!
//! These tests drive the real orchestrator against a local directory tree
//! laid out like the remote servers (`<host>_<server_id>/...`) and check the
//! JSON lines it writes.
//!
//! # Test Structure
//!
//! - `helpers/` -- Shared test utilities (environment builder, output capture)
//! - `scenarios/` -- Test files organized by scenario
//!
//! # Running
//!
//! ```bash
//! cargo test -p killfeed-daemon --test e2e
//! ```

mod helpers;
mod scenarios;
