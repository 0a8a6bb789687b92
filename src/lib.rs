//! # kiln - a small C/C++ build orchestrator
//!
//! kiln compiles every translation unit of a target to an object file with a
//! bounded number of compiler processes in flight, skips units whose object is
//! newer than their source, links the objects into one executable and can
//! rebuild automatically when a watched file changes.
//!
//! ## Module Organization
//!
//! - [`build`] - Compile/link pipeline, incremental checks and watch loop
//! - [`config`] - Configuration parsing (`kiln.toml`)
//! - [`process`] - External process capability
//! - [`ide`] - `compile_commands.json` generation

/// Core build engine.
pub mod build;

/// Configuration file parsing (`kiln.toml`).
pub mod config;

/// Editor tooling (clangd compile database).
pub mod ide;

/// Running external programs.
pub mod process;

/// Terminal output helpers.
pub mod ui;
