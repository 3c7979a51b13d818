//! Process exit codes. Stable: scripts depend on these.

pub const SUCCESS: i32 = 0;
/// The pipeline ran but the result demands human attention.
pub const NEEDS_REVIEW: i32 = 1;
pub const CONFIG_ERROR: i32 = 2;
pub const PIPELINE_ERROR: i32 = 3;
