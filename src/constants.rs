// Shared constants for the sync engine

/// Maximum connection attempts per push retry cycle. Matches the external
/// transport's documented default policy; the engine relies on it as a contract.
pub const RECONNECT_ATTEMPTS: u32 = 5;

/// Fixed delay between push connection attempts (seconds).
pub const RECONNECT_DELAY: f64 = 1.0;

/// Heat intensity for High/Critical records.
pub const HEAT_WEIGHT_SEVERE: f64 = 1.5;

/// Heat intensity for Moderate records.
pub const HEAT_WEIGHT_MODERATE: f64 = 1.0;

/// Heat intensity for everything else.
pub const HEAT_WEIGHT_BASE: f64 = 0.6;

/// Disease label carried by all vegetation-stress records.
pub const STRESS_DISEASE_LABEL: &str = "NDVI Stress";

/// Initial map viewport center (lat, lon).
pub const DEFAULT_CENTER: (f64, f64) = (20.5, 78.5);

/// Initial map viewport zoom level.
pub const DEFAULT_ZOOM: u8 = 6;

/// Zoom level used when flying to a focus point.
pub const FOCUS_ZOOM: u8 = 16;

/// Interval between work-dir state writes (seconds).
pub const WRITE_STATE_INTERVAL_SECS: u64 = 5;
