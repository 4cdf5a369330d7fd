use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::source::{FIRST_GAMEWEEK, LAST_GAMEWEEK, SeasonSource};
use crate::table::{
    GAMEWEEK_COLUMN, KEY_COLUMNS, NAME_COLUMN, SEASON_COLUMN, Table, concat, intersect_columns,
    parse_gameweek,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    #[default]
    FirstSeenWins,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeasonSourceKind {
    MergedOnly,
    MergedWithGameweeks,
    GameweeksOnly,
}

#[derive(Debug, Clone)]
pub struct SeasonTable {
    pub season: String,
    pub table: Table,
    pub source_kind: SeasonSourceKind,
    pub individual_gameweeks: Vec<u32>,
    pub failed_gameweeks: Vec<u32>,
    pub duplicates_dropped: usize,
    pub incomplete_rows_dropped: usize,
}

impl SeasonTable {
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn gameweek_range(&self) -> Option<(u32, u32)> {
        self.table.gameweek_range()
    }
}

pub struct SeasonReconciler<'a> {
    source: &'a dyn SeasonSource,
    policy: DuplicatePolicy,
}

impl<'a> SeasonReconciler<'a> {
    pub fn new(source: &'a dyn SeasonSource) -> Self {
        Self {
            source,
            policy: DuplicatePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn load_merged_only(&self, season: &str) -> Option<SeasonTable> {
        let merged = self.fetch_merged(season)?;
        self.combine(season, Some(merged), Vec::new(), Vec::new())
    }

    pub fn reconcile_season(&self, season: &str) -> Option<SeasonTable> {
        info!(season, "reconstructing season");
        let merged = self.fetch_merged(season);

        let available = self.available_gameweeks(season);
        info!(
            season,
            available = available.len(),
            "individual gameweek files available"
        );

        let missing = match &merged {
            Some(table) => {
                let covered = table.gameweeks();
                if let (Some(lo), Some(hi)) = (covered.iter().min(), covered.iter().max()) {
                    debug!(season, lo, hi, "merged file gameweek range");
                }
                available
                    .into_iter()
                    .filter(|gw| !covered.contains(gw))
                    .collect::<Vec<_>>()
            }
            None => available,
        };
        info!(
            season,
            merged = merged.is_some(),
            to_fetch = missing.len(),
            "loading missing gameweeks"
        );

        let mut individual = Vec::with_capacity(missing.len());
        let mut failed = Vec::new();
        for gw in missing {
            match self.source.fetch_gameweek(season, gw) {
                Ok(table) => individual.push((gw, table)),
                Err(err) => {
                    warn!(season, gameweek = gw, error = %err, "skipping gameweek");
                    failed.push(gw);
                }
            }
        }

        self.combine(season, merged, individual, failed)
    }

    fn fetch_merged(&self, season: &str) -> Option<Table> {
        match self.source.fetch_merged(season) {
            Ok(table) => {
                info!(season, rows = table.len(), "loaded merged file");
                Some(table)
            }
            Err(err) => {
                warn!(season, error = %err, "merged file unavailable");
                None
            }
        }
    }

    fn available_gameweeks(&self, season: &str) -> Vec<u32> {
        (FIRST_GAMEWEEK..=LAST_GAMEWEEK)
            .filter(|gw| self.source.probe_gameweek(season, *gw))
            .collect()
    }

    fn combine(
        &self,
        season: &str,
        merged: Option<Table>,
        individual: Vec<(u32, Table)>,
        failed_gameweeks: Vec<u32>,
    ) -> Option<SeasonTable> {
        let source_kind = match (merged.is_some(), individual.is_empty()) {
            (true, true) => SeasonSourceKind::MergedOnly,
            (true, false) => SeasonSourceKind::MergedWithGameweeks,
            (false, false) => SeasonSourceKind::GameweeksOnly,
            (false, true) => {
                warn!(season, "no merged file and no gameweek files; season skipped");
                return None;
            }
        };

        let tables: Vec<&Table> = merged
            .iter()
            .chain(individual.iter().map(|(_, t)| t))
            .collect();
        let columns = intersect_columns(&tables);
        info!(season, common_columns = columns.len(), "intersected columns");
        if let Some(missing) = KEY_COLUMNS
            .iter()
            .find(|key| !columns.iter().any(|c| c == *key))
        {
            warn!(season, column = *missing, "key column lost in intersection; season skipped");
            return None;
        }

        let mut table = concat(&columns, &tables);
        let incomplete_rows_dropped = drop_incomplete_keys(&mut table);
        let duplicates_dropped = deduplicate(&mut table, self.policy);

        let out = SeasonTable {
            season: season.to_string(),
            table,
            source_kind,
            individual_gameweeks: individual.iter().map(|(gw, _)| *gw).collect(),
            failed_gameweeks,
            duplicates_dropped,
            incomplete_rows_dropped,
        };
        match out.gameweek_range() {
            Some((lo, hi)) => info!(
                season,
                rows = out.len(),
                duplicates = duplicates_dropped,
                "season complete, GWs {lo}-{hi}"
            ),
            None => info!(season, rows = out.len(), "season complete, no gameweeks"),
        }
        Some(out)
    }
}

pub fn drop_incomplete_keys(table: &mut Table) -> usize {
    let (Some(name), Some(season), Some(gw)) = (
        table.column_index(NAME_COLUMN),
        table.column_index(SEASON_COLUMN),
        table.column_index(GAMEWEEK_COLUMN),
    ) else {
        return 0;
    };
    table.retain_rows(|row| {
        !row[name].is_empty() && !row[season].is_empty() && parse_gameweek(&row[gw]).is_some()
    })
}

/// Drops repeated (name, gameweek, season) rows according to `policy`. Gameweeks compare
/// numerically so "3" and "3.0" are the same key.
pub fn deduplicate(table: &mut Table, policy: DuplicatePolicy) -> usize {
    let (Some(name), Some(season), Some(gw)) = (
        table.column_index(NAME_COLUMN),
        table.column_index(SEASON_COLUMN),
        table.column_index(GAMEWEEK_COLUMN),
    ) else {
        return 0;
    };
    match policy {
        DuplicatePolicy::FirstSeenWins => {
            let mut seen: HashSet<(String, Option<u32>, String)> = HashSet::new();
            table.retain_rows(|row| {
                let key = (
                    row[name].clone(),
                    parse_gameweek(&row[gw]),
                    row[season].clone(),
                );
                seen.insert(key)
            })
        }
    }
}
