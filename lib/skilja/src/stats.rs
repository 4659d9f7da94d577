use serde::Serialize;
use tracing::info;

#[derive(Default, Clone, Debug, Serialize)]
pub struct MapPhaseStats {
    pub tasks: usize,
    pub total_emits: u64,
    pub total_records_out: u64,
    pub total_bytes_out: u64,
    /// Malformed input records the mappers skipped, counted from successful
    /// task attempts only.
    pub skipped_records: u64,
    pub retries: u64,
    pub min_task_ms: u64,
    pub max_task_ms: u64,
    pub wall_ms: u64,
}

#[derive(Default, Clone, Debug, Serialize)]
pub struct ShufflePhaseStats {
    pub reducers: usize,
    pub total_records: u64,
    pub total_bytes: u64,
    pub min_reducer_ms: u64,
    pub max_reducer_ms: u64,
    pub wall_ms: u64,
}

#[derive(Default, Clone, Debug, Serialize)]
pub struct ReducePhaseStats {
    pub reducers: usize,
    pub total_records: u64,
    pub total_groups: u64,
    pub min_reducer_ms: u64,
    pub max_reducer_ms: u64,
    pub wall_ms: u64,
}

/// Per-run phase accounting, logged once per phase and returned to the
/// caller for inspection.
#[derive(Default, Clone, Debug, Serialize)]
pub struct RunStats {
    pub map: MapPhaseStats,
    pub shuffle: ShufflePhaseStats,
    pub reduce: ReducePhaseStats,
}

impl RunStats {
    pub fn log(&self, stage: &str) {
        info!(
            stage,
            phase = "map",
            tasks = self.map.tasks,
            total_emits = self.map.total_emits,
            total_records_out = self.map.total_records_out,
            total_bytes_out = self.map.total_bytes_out,
            skipped_records = self.map.skipped_records,
            retries = self.map.retries,
            min_task_ms = self.map.min_task_ms,
            max_task_ms = self.map.max_task_ms,
            wall_ms = self.map.wall_ms,
            "map phase complete"
        );
        info!(
            stage,
            phase = "shuffle",
            reducers = self.shuffle.reducers,
            total_records = self.shuffle.total_records,
            total_bytes = self.shuffle.total_bytes,
            min_reducer_ms = self.shuffle.min_reducer_ms,
            max_reducer_ms = self.shuffle.max_reducer_ms,
            wall_ms = self.shuffle.wall_ms,
            "shuffle phase complete"
        );
        info!(
            stage,
            phase = "reduce",
            reducers = self.reduce.reducers,
            total_records = self.reduce.total_records,
            total_groups = self.reduce.total_groups,
            min_reducer_ms = self.reduce.min_reducer_ms,
            max_reducer_ms = self.reduce.max_reducer_ms,
            wall_ms = self.reduce.wall_ms,
            "reduce phase complete"
        );
    }
}
