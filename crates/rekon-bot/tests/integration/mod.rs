//! Shared fixtures for rekon-bot integration tests.

pub mod common;
