//! Stable exit codes for the fleet CLI.

/// Command finished, including tournaments nobody won.
pub const OK: i32 = 0;
/// Invalid arguments, configuration, plan, or any other error.
pub const ERROR: i32 = 1;
/// Interrupted by Ctrl-C.
pub const INTERRUPTED: i32 = 130;
