//! Shared helpers for E2E tests.

pub mod env;
pub mod output;
