/// Application constants

// API
pub const API_VERSION: &str = "v1";

// Partition read by the health probe; never written
pub const HEALTH_PROBE_PARTITION: &str = "__health__";
