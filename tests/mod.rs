//! Integration tests: sanitizing real in-memory documents through the public API

mod fixtures;
mod integration;
