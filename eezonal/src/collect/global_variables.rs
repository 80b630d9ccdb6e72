/// Earth Engine REST endpoint (without version)
pub const EE_API_URL: &str = "https://earthengine.googleapis.com";

pub const EE_API_VERSION: &str = "v1";

/// Cloud project hosting the public data catalog
pub const EE_PUBLIC_PROJECT: &str = "earthengine-public";

// Environment variables read by ClientOptions::from_env
pub const ENV_PROJECT: &str = "EE_PROJECT";
pub const ENV_ACCESS_TOKEN: &str = "EE_ACCESS_TOKEN";
pub const ENV_API_URL: &str = "EE_API_URL";

/// Per-request timeout, in seconds. Large collections over detailed polygons are slow.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// First retry delay, doubled on each further attempt
pub const RETRY_BASE_DELAY_MS: u64 = 500;

/// Upper bound on a single retry delay
pub const MAX_RETRY_DELAY_SECS: u64 = 30;

/// Square metres per hectare
pub const M2_PER_HECTARE: f64 = 1e4;

/// Pixel budget for categorical reductions (best effort is disabled there)
pub const DEFAULT_MAX_PIXELS: f64 = 1e13;

/// Raster properties copied into each record, with their record field names
pub const IDENTITY_PROPERTIES: [(&str, &str); 3] = [
    ("system:time_start", "system_time_start"),
    ("system:time_end", "system_time_end"),
    ("system:id", "system_id"),
];
