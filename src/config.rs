//! Application-level configuration loading: match timings, matchmaking and content settings.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_ARENA_CONFIG_PATH";
/// Environment variable that overrides the question service base URL.
const QUESTION_API_URL_ENV: &str = "QUESTION_API_URL";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Timings and scoring rules applied to every match room.
    pub match_settings: MatchSettings,
    /// Matchmaking queue rules.
    pub matchmaking: MatchmakingSettings,
    /// Question content service access.
    pub content: ContentSettings,
}

/// Timings and scoring rules copied into each match room at creation.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSettings {
    /// Seconds counted down between "both ready" and the first question.
    pub countdown_secs: u32,
    /// Whole-match clock in seconds.
    pub match_duration_secs: u32,
    /// Time allowed per question.
    pub question_duration: Duration,
    /// Time a disconnected player has to come back while the match is active.
    pub reconnect_grace: Duration,
    /// Remaining seconds at which the low-time warning is sent.
    pub low_time_threshold_secs: u32,
    /// Time a room may spend before starting; also the pre-start expiry when both players drop.
    pub join_window: Duration,
    /// Delay between a terminal phase and the room being removed.
    pub cleanup_cooldown: Duration,
    /// Number of questions requested from the content service.
    pub target_question_count: usize,
    /// Guaranteed minimum number of questions per match.
    pub min_question_count: usize,
    /// Points for a correct answer.
    pub correct_points: u32,
    /// Maximum bonus for an instant correct answer.
    pub time_bonus_max: u32,
    /// Distance from the centre line to a goal.
    pub goal_line: i8,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            countdown_secs: 3,
            match_duration_secs: 60,
            question_duration: Duration::from_secs(10),
            reconnect_grace: Duration::from_secs(30),
            low_time_threshold_secs: 10,
            join_window: Duration::from_secs(60),
            cleanup_cooldown: Duration::from_secs(60),
            target_question_count: 15,
            min_question_count: 10,
            correct_points: 100,
            time_bonus_max: 50,
            goal_line: 5,
        }
    }
}

/// Matchmaking queue rules.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchmakingSettings {
    /// Largest grade difference accepted when pairing.
    pub grade_tolerance: u8,
    /// Time after which a waiting entry is evicted.
    pub max_queue_wait: Duration,
    /// Interval of the eviction sweep.
    pub sweep_interval: Duration,
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            grade_tolerance: 1,
            max_queue_wait: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

/// Access to the question content service.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentSettings {
    /// Base URL of the platform API serving `/api/questions`.
    pub base_url: String,
    /// Upper bound on a question fetch before falling back.
    pub fetch_timeout: Duration,
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".into(),
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    info!(path = %path.display(), "loaded configuration file");
                    raw.into()
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        if let Some(url) = env::var(QUESTION_API_URL_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
        {
            config.content.base_url = url;
        }

        config
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            match_settings: MatchSettings::default(),
            matchmaking: MatchmakingSettings::default(),
            content: ContentSettings::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(rename = "match")]
    match_settings: RawMatchSettings,
    matchmaking: RawMatchmaking,
    content: RawContent,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMatchSettings {
    countdown_secs: Option<u32>,
    match_duration_secs: Option<u32>,
    question_secs: Option<u64>,
    reconnect_grace_secs: Option<u64>,
    low_time_threshold_secs: Option<u32>,
    join_window_secs: Option<u64>,
    cleanup_cooldown_secs: Option<u64>,
    target_question_count: Option<usize>,
    min_question_count: Option<usize>,
    correct_points: Option<u32>,
    time_bonus_max: Option<u32>,
    goal_line: Option<i8>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMatchmaking {
    grade_tolerance: Option<u8>,
    max_queue_wait_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawContent {
    base_url: Option<String>,
    fetch_timeout_ms: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            match_settings: value.match_settings.into(),
            matchmaking: value.matchmaking.into(),
            content: value.content.into(),
        }
    }
}

impl From<RawMatchSettings> for MatchSettings {
    fn from(raw: RawMatchSettings) -> Self {
        let defaults = MatchSettings::default();
        let min_question_count = raw
            .min_question_count
            .unwrap_or(defaults.min_question_count)
            .max(1);
        Self {
            countdown_secs: raw.countdown_secs.unwrap_or(defaults.countdown_secs),
            match_duration_secs: raw
                .match_duration_secs
                .unwrap_or(defaults.match_duration_secs)
                .max(1),
            question_duration: raw
                .question_secs
                .map(|secs| Duration::from_secs(secs.max(1)))
                .unwrap_or(defaults.question_duration),
            reconnect_grace: raw
                .reconnect_grace_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.reconnect_grace),
            low_time_threshold_secs: raw
                .low_time_threshold_secs
                .unwrap_or(defaults.low_time_threshold_secs),
            join_window: raw
                .join_window_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.join_window),
            cleanup_cooldown: raw
                .cleanup_cooldown_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.cleanup_cooldown),
            target_question_count: raw
                .target_question_count
                .unwrap_or(defaults.target_question_count)
                .max(min_question_count),
            min_question_count,
            correct_points: raw.correct_points.unwrap_or(defaults.correct_points),
            time_bonus_max: raw.time_bonus_max.unwrap_or(defaults.time_bonus_max),
            goal_line: raw.goal_line.unwrap_or(defaults.goal_line).max(1),
        }
    }
}

impl From<RawMatchmaking> for MatchmakingSettings {
    fn from(raw: RawMatchmaking) -> Self {
        let defaults = MatchmakingSettings::default();
        Self {
            grade_tolerance: raw.grade_tolerance.unwrap_or(defaults.grade_tolerance),
            max_queue_wait: raw
                .max_queue_wait_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_queue_wait),
            sweep_interval: raw
                .sweep_interval_secs
                .map(|secs| Duration::from_secs(secs.max(1)))
                .unwrap_or(defaults.sweep_interval),
        }
    }
}

impl From<RawContent> for ContentSettings {
    fn from(raw: RawContent) -> Self {
        let defaults = ContentSettings::default();
        Self {
            base_url: raw.base_url.unwrap_or(defaults.base_url),
            fetch_timeout: raw
                .fetch_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.fetch_timeout),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let raw: RawConfig = serde_json::from_str("{}").unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.match_settings, MatchSettings::default());
        assert_eq!(config.matchmaking, MatchmakingSettings::default());
        assert_eq!(config.content, ContentSettings::default());
    }

    #[test]
    fn partial_document_overrides_only_given_fields() {
        let raw: RawConfig = serde_json::from_str(
            r#"{
                "match": { "question_secs": 7, "reconnect_grace_secs": 12 },
                "matchmaking": { "grade_tolerance": 2 },
                "content": { "fetch_timeout_ms": 1500 }
            }"#,
        )
        .unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(
            config.match_settings.question_duration,
            Duration::from_secs(7)
        );
        assert_eq!(
            config.match_settings.reconnect_grace,
            Duration::from_secs(12)
        );
        assert_eq!(config.match_settings.countdown_secs, 3);
        assert_eq!(config.matchmaking.grade_tolerance, 2);
        assert_eq!(config.content.fetch_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn target_count_never_drops_below_minimum() {
        let raw: RawConfig = serde_json::from_str(
            r#"{ "match": { "target_question_count": 4, "min_question_count": 8 } }"#,
        )
        .unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.match_settings.target_question_count, 8);
    }
}
