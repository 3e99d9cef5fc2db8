// settings.rs - Process settings read from the environment (.env supported)
use crate::gateway::PollPolicy;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_RUN_TTL_HOURS: u32 = 24;

/// Models used for each kind of request
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSet {
    pub analysis: String,
    pub image: String,
    pub video: String,
}

impl Default for ModelSet {
    fn default() -> Self {
        Self {
            analysis: "gemini-3-flash-preview".to_string(),
            image: "gemini-3-pro-image-preview".to_string(),
            video: "veo-3.1-generate-preview".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub models: ModelSet,
    pub video_poll: PollPolicy,
    /// Runs older than this are dropped from the in-memory store
    pub run_ttl: chrono::Duration,
    pub bind_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_base_url: DEFAULT_BASE_URL.to_string(),
            models: ModelSet::default(),
            video_poll: PollPolicy::default(),
            run_ttl: chrono::Duration::hours(DEFAULT_RUN_TTL_HOURS as i64),
            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; unset or blank values keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Settings::default();

        let seconds = |key: &str, fallback: Duration| match get(key) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) => Duration::from_secs(secs),
                Err(_) => {
                    tracing::warn!("{} has non-numeric value '{}', using {}s", key, raw, fallback.as_secs());
                    fallback
                }
            },
            None => fallback,
        };

        let run_ttl_hours = match get("ARCHFLOW_RUN_TTL_HOURS") {
            Some(raw) => match raw.parse::<u32>() {
                Ok(hours) if hours > 0 => hours,
                _ => {
                    tracing::warn!(
                        "ARCHFLOW_RUN_TTL_HOURS must be a positive number of hours, got '{}', using {}h",
                        raw,
                        DEFAULT_RUN_TTL_HOURS
                    );
                    DEFAULT_RUN_TTL_HOURS
                }
            },
            None => DEFAULT_RUN_TTL_HOURS,
        };

        let models = ModelSet {
            analysis: get("ARCHFLOW_ANALYSIS_MODEL").unwrap_or(defaults.models.analysis),
            image: get("ARCHFLOW_IMAGE_MODEL").unwrap_or(defaults.models.image),
            video: get("ARCHFLOW_VIDEO_MODEL").unwrap_or(defaults.models.video),
        };

        Self {
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_base_url: get("GEMINI_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.gemini_base_url),
            models,
            video_poll: sane_poll_policy(
                seconds("ARCHFLOW_VIDEO_POLL_SECS", defaults.video_poll.interval),
                seconds("ARCHFLOW_VIDEO_MAX_WAIT_SECS", defaults.video_poll.max_wait),
            ),
            run_ttl: chrono::Duration::hours(i64::from(run_ttl_hours)),
            bind_addr: get("ARCHFLOW_BIND_ADDR").unwrap_or(defaults.bind_addr),
        }
    }
}

/// A zero interval would spin, and a max wait below one interval times out every video.
fn sane_poll_policy(interval: Duration, max_wait: Duration) -> PollPolicy {
    let defaults = PollPolicy::default();
    let interval = if interval.is_zero() {
        tracing::warn!(
            "ARCHFLOW_VIDEO_POLL_SECS must be at least 1, using {}s",
            defaults.interval.as_secs()
        );
        defaults.interval
    } else {
        interval
    };
    let max_wait = if max_wait < interval {
        let raised = defaults.max_wait.max(interval);
        tracing::warn!(
            "ARCHFLOW_VIDEO_MAX_WAIT_SECS ({}s) is shorter than the poll interval ({}s), using {}s",
            max_wait.as_secs(),
            interval.as_secs(),
            raised.as_secs()
        );
        raised
    } else {
        max_wait
    };
    PollPolicy { interval, max_wait }
}
