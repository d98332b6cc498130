//! Default knobs shared by the configuration layer and the CLI.

/// Apps tracked when neither the config file nor `--apps` names any.
pub const DEFAULT_TARGET_APPS: &[&str] = &[
    "com.whatsapp",
    "com.instagram.android",
    "com.zhiliaoapp.musically",
    "com.android.chrome",
    "com.google.android.gm",
    "com.google.android.youtube",
    "com.google.android.apps.maps",
    "com.facebook.katana",
    "com.facebook.orca",
    "com.spotify.music",
    "com.snapchat.android",
    "com.discord",
    "com.amazon.mShop.android.shopping",
    "org.telegram.messenger",
    "com.reddit.frontpage",
    "com.google.android.apps.photos",
    "com.google.android.apps.docs",
    "com.squareup.cash",
    "com.ubercab",
    "com.supercell.clashroyale",
];

// Ingestion cycle
pub const DEFAULT_REVIEWS_PER_APP: u32 = 300;
pub const DEFAULT_INTERVAL_SECONDS: u64 = 14_400;
pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_COUNTRY: &str = "us";
pub const DEFAULT_DATABASE_PATH: &str = "data/reviews.db";
pub const DEFAULT_CONFIG_FILE: &str = "review_ingest.toml";

// Review source
pub const DEFAULT_SOURCE_URL: &str = "http://127.0.0.1:8080";
pub const MIN_DELAY_SECS: f64 = 1.0;
pub const MAX_DELAY_SECS: f64 = 3.0;
pub const MAX_RETRIES: u32 = 3;
pub const RETRY_BASE_DELAY_SECS: f64 = 2.0;
pub const RETRY_MAX_DELAY_SECS: f64 = 30.0;
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

// Health monitor
pub const LOOKBACK_WINDOW: usize = 10;
pub const TRAILING_AVERAGE_WINDOW: usize = 5;
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

// Logging
pub const LOG_DIR: &str = "logs";
pub const LOG_FILE: &str = "ingestion.log";

/// Error cause recorded on app results rebuilt from a stored failure summary.
pub const HISTORICAL_FAILURE: &str = "historical_failure";

/// Marker that precedes the failed app ids in a run's error summary.
pub const FAILED_APPS_MARKER: &str = "apps failed:";
