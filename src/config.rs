use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str =
    "https://raw.githubusercontent.com/vaastav/Fantasy-Premier-League/master/data";
pub const DEFAULT_DB_PATH: &str = "data/fpl_complete.sqlite";
pub const DEFAULT_MODEL_DIR: &str = "models";
pub const DEFAULT_COMPLETE_SEASONS: &[&str] = &["2020-21", "2021-22", "2022-23", "2023-24"];
pub const DEFAULT_PARTIAL_SEASONS: &[&str] = &["2024-25"];
pub const DEFAULT_TRAIN_SEASONS: &[&str] = &["2020-21", "2021-22", "2022-23"];
pub const DEFAULT_VAL_SEASONS: &[&str] = &["2023-24"];
pub const DEFAULT_TEST_SEASONS: &[&str] = &["2024-25"];
pub const DEFAULT_MIN_GAMES: u32 = 5;

const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonPlan {
    pub complete_seasons: Vec<String>,
    pub partial_seasons: Vec<String>,
}

impl SeasonPlan {
    pub fn new(complete: &[&str], partial: &[&str]) -> Self {
        Self {
            complete_seasons: complete.iter().map(|s| s.to_string()).collect(),
            partial_seasons: partial.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.complete_seasons.is_empty() && self.partial_seasons.is_empty()
    }

    pub fn total(&self) -> usize {
        self.complete_seasons.len() + self.partial_seasons.len()
    }
}

impl Default for SeasonPlan {
    fn default() -> Self {
        Self::new(DEFAULT_COMPLETE_SEASONS, DEFAULT_PARTIAL_SEASONS)
    }
}

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub base_url: String,
    pub db_path: PathBuf,
    pub seasons: SeasonPlan,
    pub probe_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            seasons: SeasonPlan::default(),
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl LoaderConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(url) = env_string("FPL_BASE_URL") {
            cfg.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(path) = env_string("FPL_DB_PATH") {
            cfg.db_path = PathBuf::from(path);
        }
        if let Some(list) = env_list("FPL_COMPLETE_SEASONS") {
            cfg.seasons.complete_seasons = list;
        }
        if let Some(list) = env_list("FPL_PARTIAL_SEASONS") {
            cfg.seasons.partial_seasons = list;
        }
        if let Some(secs) = env_u64("FPL_PROBE_TIMEOUT_SECS") {
            cfg.probe_timeout = Duration::from_secs(secs.clamp(1, 120));
        }
        if let Some(secs) = env_u64("FPL_REQUEST_TIMEOUT_SECS") {
            cfg.request_timeout = Duration::from_secs(secs.clamp(1, 600));
        }
        cfg
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPlan {
    pub train: Vec<String>,
    pub validation: Vec<String>,
    pub test: Vec<String>,
}

impl Default for SplitPlan {
    fn default() -> Self {
        Self {
            train: to_owned(DEFAULT_TRAIN_SEASONS),
            validation: to_owned(DEFAULT_VAL_SEASONS),
            test: to_owned(DEFAULT_TEST_SEASONS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub db_path: PathBuf,
    pub model_dir: PathBuf,
    pub min_games: u32,
    pub split: SplitPlan,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            min_games: DEFAULT_MIN_GAMES,
            split: SplitPlan::default(),
        }
    }
}

impl TrainConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(path) = env_string("FPL_DB_PATH") {
            cfg.db_path = PathBuf::from(path);
        }
        if let Some(dir) = env_string("FPL_MODEL_DIR") {
            cfg.model_dir = PathBuf::from(dir);
        }
        if let Some(n) = env_u64("FPL_MIN_GAMES") {
            cfg.min_games = u32::try_from(n).unwrap_or(DEFAULT_MIN_GAMES);
        }
        if let Some(list) = env_list("FPL_TRAIN_SEASONS") {
            cfg.split.train = list;
        }
        if let Some(list) = env_list("FPL_VAL_SEASONS") {
            cfg.split.validation = list;
        }
        if let Some(list) = env_list("FPL_TEST_SEASONS") {
            cfg.split.test = list;
        }
        cfg
    }
}

pub fn parse_season_list(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in raw.split([',', ';', ' ']) {
        let season = part.trim();
        if season.is_empty() || out.iter().any(|s| s == season) {
            continue;
        }
        out.push(season.to_string());
    }
    out
}

fn to_owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env_string(key).map(|raw| parse_season_list(&raw))
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key)?.parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::{SeasonPlan, parse_season_list};

    #[test]
    fn season_list_dedups_and_trims() {
        assert_eq!(
            parse_season_list(" 2020-21, 2021-22;2020-21  "),
            vec!["2020-21".to_string(), "2021-22".to_string()]
        );
        assert!(parse_season_list(" , ;").is_empty());
    }

    #[test]
    fn default_plan_covers_five_seasons() {
        let plan = SeasonPlan::default();
        assert_eq!(plan.total(), 5);
        assert_eq!(plan.partial_seasons, vec!["2024-25".to_string()]);
    }
}
