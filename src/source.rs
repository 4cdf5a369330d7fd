use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Result, anyhow};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::LoaderConfig;
use crate::http_client::HttpClients;
use crate::table::{GAMEWEEK_COLUMN, SEASON_COLUMN, Table};

pub const FIRST_GAMEWEEK: u32 = 1;
pub const LAST_GAMEWEEK: u32 = 38;

const MERGED_FILE: &str = "merged_gw.csv";

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },
    #[error("{url} returned http {status}")]
    Status { url: String, status: u16 },
    #[error("could not decode {url}: {message}")]
    Parse { url: String, message: String },
    #[error("no data for {unit}")]
    Missing { unit: String },
}

pub trait SeasonSource {
    fn fetch_merged(&self, season: &str) -> Result<Table, FetchError>;
    fn probe_gameweek(&self, season: &str, gameweek: u32) -> bool;
    fn fetch_gameweek(&self, season: &str, gameweek: u32) -> Result<Table, FetchError>;
}

pub fn merged_url(base_url: &str, season: &str) -> String {
    format!("{}/{season}/gws/{MERGED_FILE}", base_url.trim_end_matches('/'))
}

pub fn gameweek_url(base_url: &str, season: &str, gameweek: u32) -> String {
    format!("{}/{season}/gws/gw{gameweek}.csv", base_url.trim_end_matches('/'))
}

pub fn tag_merged(mut table: Table, season: &str) -> Table {
    table.set_constant_column(SEASON_COLUMN, season);
    table
}

pub fn tag_gameweek(mut table: Table, season: &str, gameweek: u32) -> Table {
    table.set_constant_column(SEASON_COLUMN, season);
    table.set_constant_column(GAMEWEEK_COLUMN, &gameweek.to_string());
    table
}

pub struct HttpSeasonSource {
    base_url: String,
    clients: HttpClients,
}

impl HttpSeasonSource {
    pub fn new(config: &LoaderConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            clients: HttpClients::new(config.request_timeout, config.probe_timeout)?,
        })
    }

    fn get_table(&self, url: &str) -> Result<Table, FetchError> {
        let resp = self
            .clients
            .fetch
            .get(url)
            .send()
            .map_err(|err| FetchError::Request {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = resp.text().map_err(|err| FetchError::Request {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        decode_csv(url, &body)
    }
}

impl SeasonSource for HttpSeasonSource {
    fn fetch_merged(&self, season: &str) -> Result<Table, FetchError> {
        let url = merged_url(&self.base_url, season);
        self.get_table(&url).map(|t| tag_merged(t, season))
    }

    fn probe_gameweek(&self, season: &str, gameweek: u32) -> bool {
        let url = gameweek_url(&self.base_url, season, gameweek);
        match self.clients.probe.head(&url).send() {
            Ok(resp) => resp.status() == StatusCode::OK,
            Err(err) => {
                debug!(%url, error = %err, "probe failed");
                false
            }
        }
    }

    fn fetch_gameweek(&self, season: &str, gameweek: u32) -> Result<Table, FetchError> {
        let url = gameweek_url(&self.base_url, season, gameweek);
        self.get_table(&url)
            .map(|t| tag_gameweek(t, season, gameweek))
    }
}

fn decode_csv(origin: &str, body: &str) -> Result<Table, FetchError> {
    let (table, stats) = Table::from_csv_str(body).map_err(|err| FetchError::Parse {
        url: origin.to_string(),
        message: format!("{err:#}"),
    })?;
    if stats.rows_skipped > 0 {
        debug!(origin, skipped = stats.rows_skipped, "skipped malformed csv rows");
    }
    Ok(table)
}

#[derive(Debug, Default)]
pub struct MemorySeasonSource {
    merged: HashMap<String, Table>,
    gameweeks: HashMap<(String, u32), Table>,
    broken: HashSet<(String, u32)>,
    unreadable_merged: HashMap<String, FetchError>,
    unreadable: HashMap<(String, u32), FetchError>,
    merged_fetches: Cell<usize>,
    probes: Cell<usize>,
    gameweek_fetches: Cell<usize>,
}

impl MemorySeasonSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_merged(mut self, season: &str, table: Table) -> Self {
        self.merged.insert(season.to_string(), table);
        self
    }

    pub fn with_gameweek(mut self, season: &str, gameweek: u32, table: Table) -> Self {
        self.gameweeks.insert((season.to_string(), gameweek), table);
        self
    }

    pub fn with_broken_gameweek(mut self, season: &str, gameweek: u32) -> Self {
        self.broken.insert((season.to_string(), gameweek));
        self
    }

    /// Reads files laid out like the remote host: `{root}/{season}/gws/merged_gw.csv` and
    /// `{root}/{season}/gws/gw{n}.csv`. Missing files are absent; unreadable ones probe as
    /// present and fail on fetch.
    pub fn from_dir(root: &Path, seasons: &[String]) -> Result<Self> {
        if !root.is_dir() {
            return Err(anyhow!("source dir {} not found", root.display()));
        }
        let mut source = Self::new();
        for season in seasons {
            let dir = root.join(season).join("gws");
            let merged_path = dir.join(MERGED_FILE);
            if merged_path.is_file() {
                match read_csv_file(&merged_path) {
                    Ok(table) => source = source.with_merged(season, table),
                    Err(err) => {
                        warn!(path = %merged_path.display(), error = %err, "unreadable merged file");
                        source.unreadable_merged.insert(season.clone(), err);
                    }
                }
            }
            for gw in FIRST_GAMEWEEK..=LAST_GAMEWEEK {
                let path = dir.join(format!("gw{gw}.csv"));
                if !path.is_file() {
                    continue;
                }
                match read_csv_file(&path) {
                    Ok(table) => source = source.with_gameweek(season, gw, table),
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "unreadable gameweek file");
                        source.unreadable.insert((season.clone(), gw), err);
                    }
                }
            }
        }
        Ok(source)
    }

    pub fn merged_fetches(&self) -> usize {
        self.merged_fetches.get()
    }

    pub fn probes(&self) -> usize {
        self.probes.get()
    }

    pub fn gameweek_fetches(&self) -> usize {
        self.gameweek_fetches.get()
    }
}

impl SeasonSource for MemorySeasonSource {
    fn fetch_merged(&self, season: &str) -> Result<Table, FetchError> {
        self.merged_fetches.set(self.merged_fetches.get() + 1);
        if let Some(err) = self.unreadable_merged.get(season) {
            return Err(err.clone());
        }
        self.merged
            .get(season)
            .cloned()
            .map(|t| tag_merged(t, season))
            .ok_or_else(|| FetchError::Missing {
                unit: format!("{season} merged"),
            })
    }

    fn probe_gameweek(&self, season: &str, gameweek: u32) -> bool {
        self.probes.set(self.probes.get() + 1);
        let key = (season.to_string(), gameweek);
        self.gameweeks.contains_key(&key)
            || self.broken.contains(&key)
            || self.unreadable.contains_key(&key)
    }

    fn fetch_gameweek(&self, season: &str, gameweek: u32) -> Result<Table, FetchError> {
        self.gameweek_fetches.set(self.gameweek_fetches.get() + 1);
        let key = (season.to_string(), gameweek);
        if self.broken.contains(&key) {
            return Err(FetchError::Status {
                url: gameweek_url("memory:", season, gameweek),
                status: 500,
            });
        }
        if let Some(err) = self.unreadable.get(&key) {
            return Err(err.clone());
        }
        self.gameweeks
            .get(&key)
            .cloned()
            .map(|t| tag_gameweek(t, season, gameweek))
            .ok_or_else(|| FetchError::Missing {
                unit: format!("{season} gw{gameweek}"),
            })
    }
}

fn read_csv_file(path: &Path) -> Result<Table, FetchError> {
    let origin = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|err| FetchError::Request {
        url: origin.clone(),
        message: err.to_string(),
    })?;
    decode_csv(&origin, &raw)
}

#[cfg(test)]
mod tests {
    use super::{MemorySeasonSource, SeasonSource, gameweek_url, merged_url};
    use crate::table::Table;

    #[test]
    fn urls_follow_host_layout() {
        assert_eq!(
            merged_url("https://host/data/", "2020-21"),
            "https://host/data/2020-21/gws/merged_gw.csv"
        );
        assert_eq!(
            gameweek_url("https://host/data", "2024-25", 7),
            "https://host/data/2024-25/gws/gw7.csv"
        );
    }

    #[test]
    fn memory_source_tags_and_counts() {
        let (gw, _) = Table::from_csv_str("name,GW\nSalah,99\n").expect("csv should parse");
        let source = MemorySeasonSource::new()
            .with_gameweek("2024-25", 3, gw)
            .with_broken_gameweek("2024-25", 4);

        assert!(source.fetch_merged("2024-25").is_err());
        assert!(source.probe_gameweek("2024-25", 3));
        assert!(source.probe_gameweek("2024-25", 4));
        assert!(!source.probe_gameweek("2024-25", 5));

        let table = source.fetch_gameweek("2024-25", 3).expect("gameweek present");
        assert_eq!(table.cell(0, "GW"), Some("3"));
        assert_eq!(table.cell(0, "season"), Some("2024-25"));
        assert!(source.fetch_gameweek("2024-25", 4).is_err());

        assert_eq!(source.merged_fetches(), 1);
        assert_eq!(source.probes(), 3);
        assert_eq!(source.gameweek_fetches(), 2);
    }
}
