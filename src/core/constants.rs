/*!
Constants for the secure transport.
*/

/// Capacity of each in-memory buffer attached to a session (20 KiB)
pub const MAX_BUFFER_SIZE: usize = 1024 * 20;

/// Number of leading bytes shown by the hex preview in trace logs
pub const HEX_PREVIEW_BYTES: usize = 30;

/// Server name a client session presents when none is configured
pub const DEFAULT_SERVER_NAME: &str = "localhost";

/// Largest single read a transport receive issues; bigger requests read short
pub const MAX_RECEIVE_SIZE: usize = 1024 * 64;
