//! Shared constants/setters for things
//!

use std::sync::LazyLock;

/// Panels per comic unless configured otherwise
pub const DEFAULT_PANEL_COUNT: usize = 6;

/// Credits charged for one generated comic, regardless of how many panels survive
pub const DEFAULT_COMIC_COST: i64 = 6;

/// Daily allowance by number of comics already created today. Counts past the end are worth 0.
pub const DAILY_ALLOWANCE_TABLE: [i64; 10] = [60, 54, 48, 42, 36, 30, 24, 18, 12, 6];

/// Prepended to every scene before it goes to the image model.
pub const STYLE_DIRECTIVE: &str = "You're a comic strip artist. Your job is to generate a comic-styled image on the following prompt: ";

/// Token ceiling for the scene planning call
pub const PLAN_MAX_OUTPUT_TOKENS: u32 = 1000;

/// Token ceiling for the caption call
pub const CAPTION_MAX_OUTPUT_TOKENS: u32 = 600;

/// Sampling temperature for both text calls
pub const PLAN_TEMPERATURE: f32 = 0.7;

/// Default per-call upstream timeout, in seconds
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 60;

/// Longest idea we accept by default
pub const DEFAULT_MAX_IDEA_CHARS: usize = 2000;

/// Header the identity proxy uses to pass the signed-in owner
pub const DEFAULT_OWNER_HEADER: &str = "x-comicgen-owner";

/// Longest owner id we accept from the identity header
pub const MAX_OWNER_ID_LEN: usize = 128;

/// Comics per history page
pub const HISTORY_PAGE_SIZE: u64 = 10;

/// URL prefix for panels stored on local disk
pub const PANEL_URL_PREFIX: &str = "/panels";

/// Max age (in seconds) for panel cache entries. Panels never change once written.
pub const PANEL_CACHE_MAX_AGE_SECONDS: u64 = 60 * 60 * 24 * 7;

/// Cache-Control value for locally served panels.
pub static PANEL_CACHE_CONTROL: LazyLock<String> = LazyLock::new(|| {
    format!(
        "public, max-age={}, immutable",
        PANEL_CACHE_MAX_AGE_SECONDS
    )
});

/// Sessions (CSRF token + flash) expire after this much inactivity, in minutes
pub const SESSION_INACTIVITY_MINUTES: i64 = 60;

#[cfg(test)]
/// Owner used in tests
pub const TEST_OWNER: &str = "user_test";
