// Application constants
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Wordfence vulnerability feed
pub const WORDFENCE_API_URL: &str =
    "https://www.wordfence.com/api/intelligence/v2/vulnerabilities/production";

// Local storage under the OS user-config directory
pub const STORAGE_DIR: &str = "wpprobe";
pub const WORDFENCE_FILE: &str = "wordfence_vulnerabilities.json";

// HTTP client limits
pub const MAX_RESPONSE_SIZE: usize = 10_485_760;
pub const MAX_REDIRECTS: usize = 10;
pub const TRANSPORT_RETRIES: usize = 2;
pub const RANGE_HEADER_VALUE: &str = "bytes=0-1048576";

// Timeouts (in seconds)
pub const PROBE_TIMEOUT: u64 = 10;
pub const WORDFENCE_API_TIMEOUT: u64 = 15;
