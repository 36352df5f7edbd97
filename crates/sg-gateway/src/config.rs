//! Gateway configuration
//!
//! Everything is overridable from the environment so a deployment can be
//! configured without flags (clap `env` attributes).

use clap::Parser;

#[derive(Debug, Clone, Parser)]
pub struct GatewayConfig {
    /// Address the HTTP API binds to
    #[arg(long, env = "SG_BIND_ADDR", default_value = "127.0.0.1:5000")]
    pub bind_addr: String,

    /// Path to the sqlite database (profiles, activity log, durable cache)
    #[arg(long, env = "SG_DB_PATH", default_value = "safegate.db")]
    pub db_path: String,

    /// Base URL of the generative moderation API
    #[arg(
        long,
        env = "SG_MODEL_API_BASE",
        default_value = "https://generativelanguage.googleapis.com/v1beta"
    )]
    pub model_api_base: String,

    /// API key for the moderation API
    #[arg(long, env = "SG_MODEL_API_KEY", default_value = "")]
    pub model_api_key: String,

    /// Model used for text and URL analysis
    #[arg(long, env = "SG_TEXT_MODEL", default_value = "gemini-2.5-pro")]
    pub text_model: String,

    /// Model used for image analysis
    #[arg(long, env = "SG_VISION_MODEL", default_value = "gemini-2.5-flash")]
    pub vision_model: String,

    /// Hard timeout for one classifier call, in ms
    #[arg(long, env = "SG_CLASSIFIER_TIMEOUT_MS", default_value_t = 15_000)]
    pub classifier_timeout_ms: u64,

    /// Timeout for fetching an image before classification, in ms
    #[arg(long, env = "SG_IMAGE_FETCH_TIMEOUT_MS", default_value_t = 8_000)]
    pub image_fetch_timeout_ms: u64,

    /// Largest image we will download for classification, in bytes
    #[arg(long, env = "SG_IMAGE_MAX_BYTES", default_value_t = 5 * 1024 * 1024)]
    pub image_max_bytes: u64,

    /// Cache TTL for text and image verdicts, in seconds
    #[arg(long, env = "SG_CACHE_TTL_SECS", default_value_t = 86_400)]
    pub cache_ttl_secs: u64,

    /// Cache TTL for URL-reputation verdicts (volatile), in seconds
    #[arg(long, env = "SG_URL_CACHE_TTL_SECS", default_value_t = 3_600)]
    pub url_cache_ttl_secs: u64,

    /// Interval of the background cache reaper, in seconds
    #[arg(long, env = "SG_CACHE_REAP_SECS", default_value_t = 300)]
    pub cache_reap_secs: u64,

    /// Requests per minute allowed per device
    #[arg(long, env = "SG_RATE_LIMIT_PER_MIN", default_value_t = 60)]
    pub rate_limit_per_min: u32,

    /// Burst capacity of the per-device bucket
    #[arg(long, env = "SG_RATE_LIMIT_BURST", default_value_t = 20)]
    pub rate_limit_burst: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        // clap fills every field from its declared default
        Self::parse_from::<_, &str>([])
    }
}
