//! Backup core CLI library.
//!
//! The `bk-core` binary resolves environment configuration and runs the
//! telemetry stack; this crate exposes its command definitions and exit codes.

pub mod cli;
pub mod exit_codes;

pub use exit_codes::ExitCode;
