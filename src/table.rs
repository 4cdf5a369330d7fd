use std::collections::{HashMap, HashSet};

use anyhow::{Result, anyhow};

pub const NAME_COLUMN: &str = "name";
pub const SEASON_COLUMN: &str = "season";
pub const GAMEWEEK_COLUMN: &str = "GW";
pub const TEAM_COLUMN: &str = "team";

pub const KEY_COLUMNS: [&str; 3] = [NAME_COLUMN, SEASON_COLUMN, GAMEWEEK_COLUMN];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CsvDecodeStats {
    pub rows_read: usize,
    pub rows_skipped: usize,
}

impl Table {
    pub fn new<S: AsRef<str>>(columns: &[S]) -> Self {
        let mut table = Self::default();
        for col in columns {
            table.add_column_name(col.as_ref());
        }
        table
    }

    pub fn from_csv_str(raw: &str) -> Result<(Self, CsvDecodeStats)> {
        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .has_headers(true)
            .from_reader(raw.as_bytes());

        let headers = reader
            .headers()
            .map_err(|err| anyhow!("read csv header: {err}"))?
            .clone();
        if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
            return Err(anyhow!("csv header is empty"));
        }

        let mut table = Self::default();
        for header in headers.iter() {
            table.add_column_name(header.trim());
        }

        let width = table.width();
        let mut stats = CsvDecodeStats::default();
        for record in reader.records() {
            let Ok(record) = record else {
                stats.rows_skipped += 1;
                continue;
            };
            if record.len() != width {
                stats.rows_skipped += 1;
                continue;
            }
            table
                .rows
                .push(record.iter().map(|cell| cell.trim().to_string()).collect());
            stats.rows_read += 1;
        }
        Ok((table, stats))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn push_row(&mut self, row: Vec<String>) -> Result<()> {
        if row.len() != self.width() {
            return Err(anyhow!(
                "row has {} cells, table has {} columns",
                row.len(),
                self.width()
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| r[idx].as_str())
    }

    pub fn column_values<'a>(&'a self, column: &str) -> Option<impl Iterator<Item = &'a str> + 'a> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().map(move |r| r[idx].as_str()))
    }

    pub fn set_constant_column(&mut self, column: &str, value: &str) {
        match self.column_index(column) {
            Some(idx) => {
                for row in &mut self.rows {
                    row[idx] = value.to_string();
                }
            }
            None => {
                self.add_column_name(column);
                for row in &mut self.rows {
                    row.push(value.to_string());
                }
            }
        }
    }

    pub fn gameweeks(&self) -> HashSet<u32> {
        self.column_values(GAMEWEEK_COLUMN)
            .map(|vals| vals.filter_map(parse_gameweek).collect())
            .unwrap_or_default()
    }

    pub fn gameweek_range(&self) -> Option<(u32, u32)> {
        let gws = self.gameweeks();
        Some((*gws.iter().min()?, *gws.iter().max()?))
    }

    pub fn distinct_count(&self, column: &str) -> usize {
        self.column_values(column)
            .map(|vals| vals.filter(|v| !v.is_empty()).collect::<HashSet<_>>().len())
            .unwrap_or(0)
    }

    pub fn project(&self, columns: &[String]) -> Option<Table> {
        let picks = columns
            .iter()
            .map(|c| self.column_index(c))
            .collect::<Option<Vec<_>>>()?;
        let mut out = Table::new(columns);
        out.rows = self
            .rows
            .iter()
            .map(|row| picks.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Some(out)
    }

    pub fn retain_rows<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&[String]) -> bool,
    {
        let before = self.rows.len();
        self.rows.retain(|row| keep(row));
        before - self.rows.len()
    }

    fn add_column_name(&mut self, raw: &str) {
        // Repeated headers get a numeric suffix so every column stays addressable.
        let mut name = raw.to_string();
        let mut n = 1;
        while self.index.contains_key(&name) {
            name = format!("{raw}.{n}");
            n += 1;
        }
        self.index.insert(name.clone(), self.columns.len());
        self.columns.push(name);
    }
}

pub fn intersect_columns(tables: &[&Table]) -> Vec<String> {
    let Some((first, rest)) = tables.split_first() else {
        return Vec::new();
    };
    first
        .columns()
        .iter()
        .filter(|c| rest.iter().all(|t| t.has_column(c)))
        .cloned()
        .collect()
}

pub fn concat(columns: &[String], tables: &[&Table]) -> Table {
    let mut out = Table::new(columns);
    for table in tables {
        if let Some(projected) = table.project(columns) {
            out.rows.extend(projected.rows);
        }
    }
    out
}

pub fn parse_gameweek(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<u32>() {
        return Some(n);
    }
    let f = raw.parse::<f64>().ok()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 {
        Some(f as u32)
    } else {
        None
    }
}
