//! Process exit codes. Scripts rely on these.

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
/// The block (or its meta file) does not exist in the bucket.
pub const NOT_FOUND: i32 = 2;
/// Interrupted by the user.
pub const CANCELLED: i32 = 130;
