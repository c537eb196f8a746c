/// Application name
pub const APP_NAME: &str = "Courier";

/// Default HTTP / WebSocket listen port
pub const DEFAULT_HTTP_PORT: u16 = 5000;

/// Maximum uploaded file size in bytes (10 MiB)
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Maximum number of group messages returned by a history query
pub const GROUP_HISTORY_LIMIT: u32 = 50;
