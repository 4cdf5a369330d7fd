use thiserror::Error;
use tracing::info;

use crate::config::SeasonPlan;
use crate::reconcile::{SeasonReconciler, SeasonSourceKind, SeasonTable};
use crate::source::SeasonSource;
use crate::table::{KEY_COLUMNS, NAME_COLUMN, Table, concat, intersect_columns};

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("no season produced any data ({attempted} attempted)")]
    NoSeasonData { attempted: usize },
    #[error("column `{column}` is not shared by every season")]
    MissingKeyColumns { column: String },
}

#[derive(Debug, Clone)]
pub struct SeasonSummary {
    pub season: String,
    pub rows: usize,
    pub gameweek_range: Option<(u32, u32)>,
    pub unique_gameweeks: usize,
    pub source_kind: SeasonSourceKind,
    pub individual_gameweeks: usize,
    pub failed_gameweeks: Vec<u32>,
    pub duplicates_dropped: usize,
}

#[derive(Debug, Clone)]
pub struct AssemblySummary {
    pub seasons_attempted: usize,
    pub seasons: Vec<SeasonSummary>,
    pub skipped_seasons: Vec<String>,
    pub total_rows: usize,
    pub unique_players: usize,
    pub columns: usize,
}

/// Every loaded season, stacked on the columns they all share.
#[derive(Debug, Clone)]
pub struct UnifiedDataset {
    pub table: Table,
    pub seasons: Vec<String>,
}

impl UnifiedDataset {
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        self.table.columns()
    }
}

pub struct DatasetAssembler<'a> {
    reconciler: SeasonReconciler<'a>,
}

impl<'a> DatasetAssembler<'a> {
    pub fn new(source: &'a dyn SeasonSource) -> Self {
        Self {
            reconciler: SeasonReconciler::new(source),
        }
    }

    pub fn from_reconciler(reconciler: SeasonReconciler<'a>) -> Self {
        Self { reconciler }
    }

    pub fn assemble(
        &self,
        plan: &SeasonPlan,
    ) -> Result<(UnifiedDataset, AssemblySummary), AssembleError> {
        info!(seasons = plan.total(), "starting historical data load");

        let mut loaded: Vec<SeasonTable> = Vec::new();
        let mut skipped = Vec::new();
        for season in &plan.complete_seasons {
            match self.reconciler.load_merged_only(season) {
                Some(table) => loaded.push(table),
                None => skipped.push(season.clone()),
            }
        }
        for season in &plan.partial_seasons {
            match self.reconciler.reconcile_season(season) {
                Some(table) => loaded.push(table),
                None => skipped.push(season.clone()),
            }
        }

        if loaded.is_empty() {
            return Err(AssembleError::NoSeasonData {
                attempted: plan.total(),
            });
        }

        let tables: Vec<&Table> = loaded.iter().map(|s| &s.table).collect();
        let columns = intersect_columns(&tables);
        if let Some(key) = KEY_COLUMNS
            .iter()
            .find(|key| !columns.iter().any(|c| c == *key))
        {
            return Err(AssembleError::MissingKeyColumns {
                column: key.to_string(),
            });
        }
        info!(columns = columns.len(), "final common columns");

        let table = concat(&columns, &tables);
        let seasons = loaded.iter().map(|s| s.season.clone()).collect::<Vec<_>>();
        let summary = AssemblySummary {
            seasons_attempted: plan.total(),
            seasons: loaded.iter().map(season_summary).collect(),
            skipped_seasons: skipped,
            total_rows: table.len(),
            unique_players: table.distinct_count(NAME_COLUMN),
            columns: columns.len(),
        };
        log_summary(&summary);

        Ok((UnifiedDataset { table, seasons }, summary))
    }
}

fn season_summary(season: &SeasonTable) -> SeasonSummary {
    SeasonSummary {
        season: season.season.clone(),
        rows: season.len(),
        gameweek_range: season.gameweek_range(),
        unique_gameweeks: season.table.gameweeks().len(),
        source_kind: season.source_kind,
        individual_gameweeks: season.individual_gameweeks.len(),
        failed_gameweeks: season.failed_gameweeks.clone(),
        duplicates_dropped: season.duplicates_dropped,
    }
}

fn log_summary(summary: &AssemblySummary) {
    info!(
        rows = summary.total_rows,
        players = summary.unique_players,
        seasons = summary.seasons.len(),
        "complete dataset summary"
    );
    for s in &summary.seasons {
        let (lo, hi) = s.gameweek_range.unwrap_or((0, 0));
        info!(
            season = %s.season,
            rows = s.rows,
            unique_gws = s.unique_gameweeks,
            "GWs {lo}-{hi}"
        );
    }
    for season in &summary.skipped_seasons {
        info!(season = %season, "season contributed no data");
    }
}
