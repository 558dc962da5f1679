//! # Metric Names and Operational Constants
//!
//! Names shared by the collectors, the health scorer and the default alert
//! rules. Keeping them in one place lets rules reference what collectors emit.

/// Session and pool metrics emitted by the database collector
pub mod database {
    pub const ACTIVE_SESSIONS: &str = "database_active_sessions";
    pub const TOTAL_SESSIONS: &str = "database_total_sessions";
    pub const FAILED_SESSIONS: &str = "database_failed_sessions";
    pub const RETRIED_SESSIONS: &str = "database_retried_sessions";
    pub const REJECTED_SESSIONS: &str = "database_rejected_sessions";
    pub const CACHE_HITS: &str = "database_cache_hits";
    pub const CACHE_HIT_RATE: &str = "database_cache_hit_rate";
    pub const SESSION_DURATION_MS: &str = "database_session_duration_ms";
    pub const POOL_SIZE: &str = "database_pool_size";
    pub const POOL_IDLE: &str = "database_pool_idle";
}

/// Host metrics emitted by the system collector
pub mod system {
    pub const CPU_USAGE: &str = "system_cpu_usage";
    pub const MEMORY_USAGE: &str = "system_memory_usage";
    pub const DISK_USAGE: &str = "system_disk_usage";
    pub const NETWORK_BYTES_RECEIVED: &str = "system_network_bytes_received";
    pub const NETWORK_BYTES_SENT: &str = "system_network_bytes_sent";
}

/// Process metrics emitted by the application collector
pub mod application {
    pub const THREAD_COUNT: &str = "application_thread_count";
    pub const CPU_USAGE: &str = "application_cpu_usage";
    pub const MEMORY_BYTES: &str = "application_memory_bytes";
}

/// Metrics emitted by the resilience collector
pub mod resilience {
    pub const HEALTH_SCORE: &str = "resilience_health_score";
}

/// Scores recorded back into the store after every health computation
pub mod health {
    pub const OVERALL_SCORE: &str = "health_overall_score";
    pub const DATABASE_SCORE: &str = "health_database_score";
    pub const SYSTEM_SCORE: &str = "health_system_score";
    pub const APPLICATION_SCORE: &str = "health_application_score";
    pub const RESILIENCE_SCORE: &str = "health_resilience_score";
}

/// Capacity and scoring defaults
pub mod defaults {
    pub const MAX_POINTS_PER_SERIES: usize = 1000;
    pub const TREND_WINDOW: usize = 100;
    pub const TREND_MIN_POINTS: usize = 10;
    pub const HEALTH_HISTORY_SIZE: usize = 100;
    pub const HEALTH_SUMMARY_WINDOW: usize = 10;
    pub const RESILIENCE_SCORE_UNAVAILABLE: f64 = 50.0;
    pub const ESCALATION_AFTER_SECONDS: u64 = 900;
}
