//! Episode statistics sinks
//!
//! Agents hand one [`EpisodeStats`] row per finished episode to the sink they
//! were built with:
//! - [`CsvStatsSink`]: appends rows to a CSV file
//! - [`MemoryStatsSink`]: keeps rows in memory, handy in tests
//! - [`NoopStatsSink`]: discards everything

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use quad_rl_core::{EpisodeStats, RLError, Result};

/// Destination for per-episode summaries
pub trait StatsSink: Send {
    /// Record one finished episode
    fn record(&mut self, stats: &EpisodeStats) -> Result<()>;
}

/// One CSV column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsColumn {
    /// Episode number
    Episode,
    /// Sum of rewards
    TotalReward,
    /// Ticks in the episode
    Steps,
    /// Exploration rate, empty when the agent has none
    Epsilon,
}

impl StatsColumn {
    /// Columns written by the DDPG agent
    pub const DDPG: &'static [StatsColumn] = &[StatsColumn::Episode, StatsColumn::TotalReward];

    /// Columns written by the DQN agent
    pub const DQN: &'static [StatsColumn] = &[
        StatsColumn::Episode,
        StatsColumn::TotalReward,
        StatsColumn::Epsilon,
    ];

    /// Header name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            StatsColumn::Episode => "episode",
            StatsColumn::TotalReward => "total_reward",
            StatsColumn::Steps => "steps",
            StatsColumn::Epsilon => "epsilon",
        }
    }

    fn value(self, stats: &EpisodeStats) -> String {
        match self {
            StatsColumn::Episode => stats.episode.to_string(),
            StatsColumn::TotalReward => stats.total_reward.to_string(),
            StatsColumn::Steps => stats.steps.to_string(),
            StatsColumn::Epsilon => stats.epsilon.map(|e| e.to_string()).unwrap_or_default(),
        }
    }
}

/// Sink that discards all rows
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStatsSink;

impl StatsSink for NoopStatsSink {
    fn record(&mut self, _stats: &EpisodeStats) -> Result<()> {
        Ok(())
    }
}

/// Sink that keeps every row; clones share the same storage
#[derive(Debug, Default, Clone)]
pub struct MemoryStatsSink {
    rows: Arc<Mutex<Vec<EpisodeStats>>>,
}

impl MemoryStatsSink {
    /// Empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every row recorded so far
    pub fn rows(&self) -> Vec<EpisodeStats> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }
}

impl StatsSink for MemoryStatsSink {
    fn record(&mut self, stats: &EpisodeStats) -> Result<()> {
        self.rows
            .lock()
            .map_err(|_| RLError::Agent("stats store lock poisoned".into()))?
            .push(stats.clone());
        Ok(())
    }
}

/// CSV file sink.
///
/// Rows are appended; the header goes out only when the file is new or empty.
pub struct CsvStatsSink {
    path: PathBuf,
    columns: Vec<StatsColumn>,
    writer: BufWriter<File>,
}

impl CsvStatsSink {
    /// Open `path` for appending
    pub fn open(path: impl Into<PathBuf>, columns: &[StatsColumn]) -> Result<Self> {
        if columns.is_empty() {
            return Err(RLError::InvalidConfig("stats sink needs at least one column".into()));
        }
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let needs_header = file.metadata()?.len() == 0;

        let mut sink = Self {
            path,
            columns: columns.to_vec(),
            writer: BufWriter::new(file),
        };
        if needs_header {
            let header: Vec<&str> = sink.columns.iter().map(|c| c.name()).collect();
            writeln!(sink.writer, "{}", header.join(","))?;
            sink.writer.flush()?;
        }
        Ok(sink)
    }

    /// Open `stats_<timestamp>.csv` inside `dir`, creating the directory
    pub fn timestamped(dir: &Path, columns: &[StatsColumn]) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
        Self::open(dir.join(format!("stats_{stamp}.csv")), columns)
    }

    /// File being written
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Columns in file order
    #[must_use]
    pub fn columns(&self) -> &[StatsColumn] {
        &self.columns
    }
}

impl StatsSink for CsvStatsSink {
    fn record(&mut self, stats: &EpisodeStats) -> Result<()> {
        let row: Vec<String> = self.columns.iter().map(|c| c.value(stats)).collect();
        writeln!(self.writer, "{}", row.join(","))?;
        self.writer.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for CsvStatsSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvStatsSink")
            .field("path", &self.path)
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}
