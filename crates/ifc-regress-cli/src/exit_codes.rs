//! Process exit codes. Part of the CLI contract.
//!
//! Per-file conversion failures never change the exit code; they are visible
//! in the report and on stdout.

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_CONFIG_ERROR: i32 = 2; // bad config/arguments, unreadable input, report write failure
