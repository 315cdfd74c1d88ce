use std::{env, str::FromStr, time::Duration};

use tracing::{info, warn};

use linksweeper_common::models::MAX_BOARD_SIDE;

#[derive(Debug, Clone)]
pub struct Config {
    /// Base of every cell and mode link, without a trailing slash.
    pub public_url: String,
    pub webhook_url: Option<String>,
    pub prefixes: Vec<String>,
    pub max_width: usize,
    pub max_height: usize,
    pub update_permits: u32,
    pub update_window: Duration,
    pub games_per_minute: u32,
    pub cleanup_interval: Duration,
    pub inactive_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            public_url: "http://localhost:8000".to_string(),
            webhook_url: None,
            prefixes: vec!["minesweeper".to_string()],
            max_width: 9,
            max_height: 9,
            update_permits: 5,
            update_window: Duration::from_secs(5),
            games_per_minute: 10,
            cleanup_interval: Duration::from_secs(60),
            inactive_timeout: Duration::from_secs(3600),
        }
    }
}

fn parse_or<T: FromStr>(name: &str, value: Option<String>, default: T) -> T {
    match value {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring unparsable {}={:?}", name, raw);
            default
        }),
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    parse_or(name, env::var(name).ok(), default)
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn split_prefixes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|prefix| prefix.trim().to_lowercase())
        .filter(|prefix| !prefix.is_empty())
        .collect()
}

fn board_side(value: usize) -> usize {
    value.clamp(1, MAX_BOARD_SIDE)
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let public_url = non_empty("PUBLIC_URL")
            .unwrap_or(defaults.public_url)
            .trim_end_matches('/')
            .to_string();

        let prefixes = non_empty("COMMAND_PREFIX")
            .map(|raw| split_prefixes(&raw))
            .filter(|prefixes| !prefixes.is_empty())
            .unwrap_or(defaults.prefixes);

        let config = Self {
            public_url,
            webhook_url: non_empty("WEBHOOK_URL"),
            prefixes,
            max_width: board_side(env_or("MAX_BOARD_WIDTH", defaults.max_width)),
            max_height: board_side(env_or("MAX_BOARD_HEIGHT", defaults.max_height)),
            update_permits: env_or("UPDATE_PERMITS_PER_WINDOW", defaults.update_permits),
            update_window: Duration::from_secs(
                env_or("UPDATE_WINDOW_SECONDS", defaults.update_window.as_secs()).max(1),
            ),
            games_per_minute: env_or("RATE_LIMIT_GAMES_PER_MINUTE", defaults.games_per_minute),
            cleanup_interval: Duration::from_secs(
                env_or("CLEANUP_INTERVAL_SECONDS", defaults.cleanup_interval.as_secs()).max(1),
            ),
            inactive_timeout: Duration::from_secs(env_or(
                "INACTIVE_GAME_TIMEOUT_SECONDS",
                defaults.inactive_timeout.as_secs(),
            )),
        };

        info!(
            "Loaded configuration: public url {}, prefixes {:?}, max board {}x{}, {} updates per {}s",
            config.public_url,
            config.prefixes,
            config.max_width,
            config.max_height,
            config.update_permits,
            config.update_window.as_secs()
        );
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_on_missing_or_bad_values() {
        assert_eq!(parse_or("X", None, 7u32), 7);
        assert_eq!(parse_or("X", Some(" 12 ".to_string()), 7u32), 12);
        assert_eq!(parse_or("X", Some("twelve".to_string()), 7u32), 7);
        assert_eq!(parse_or("X", Some("-1".to_string()), 7u32), 7);
    }

    #[test]
    fn prefixes_are_split_and_lowercased() {
        assert_eq!(
            split_prefixes(" Minesweeper, ms ,,"),
            vec!["minesweeper".to_string(), "ms".to_string()]
        );
        assert!(split_prefixes(" , ").is_empty());
    }

    #[test]
    fn board_sides_are_clamped() {
        assert_eq!(board_side(0), 1);
        assert_eq!(board_side(9), 9);
        assert_eq!(board_side(40), MAX_BOARD_SIDE);
    }
}
