pub const SUCCESS: i32 = 0;
/// Bad arguments, unreadable or malformed scenario, invalid source profile
pub const INPUT_ERROR: i32 = 1;
/// The run itself failed, e.g. writing the output
pub const EXECUTION_ERROR: i32 = 2;
