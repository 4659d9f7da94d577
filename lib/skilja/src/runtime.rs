use crate::api::{Combiner, Mapper, Reducer};
use crate::constants::{
    DEFAULT_COMBINE_BUFFER_RECORDS, DEFAULT_LOCAL_BATCH_BYTES, DEFAULT_WRITER_QUEUE_CAP,
    ENV_COMBINE_BUFFER_RECORDS, ENV_KEEP_INTERMEDIATES, ENV_LOCAL_BATCH_BYTES, ENV_LOCAL_TASKS,
    ENV_NUM_REDUCERS, ENV_WRITER_QUEUE_CAP, MAX_TASK_ATTEMPTS, RUNS_ROOT,
};
use crate::error::EngineError;
use crate::io::{
    ensure_dir, hash_to_partition, list_files_recursive, open_writer, push_record, read_lines,
    read_record,
};
use crate::stats::{MapPhaseStats, ReducePhaseStats, RunStats, ShufflePhaseStats};
use crate::writer::{partition_file, TaskWriter};
use anyhow::{Context, Result};
use memmap2::Mmap;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

// Distinguishes the scratch dirs of pipeline runs chained within one process.
static RUN_SEQ: AtomicUsize = AtomicUsize::new(0);

/// One map -> shuffle -> reduce pass over line-oriented input files.
///
/// Map tasks own disjoint file partitions and run on the rayon pool; each
/// buffers emits per key, folds them through the stage's [`Combiner`] and
/// spills bincode-framed records into per-reducer partition files. The
/// shuffle mmaps every task's file for a partition, sorts record offsets by
/// raw key bytes and concatenates them into one grouped run; this is the hard
/// barrier between phases. Reducers then stream consecutive equal-key groups.
///
/// A failed task is re-run with the same partition (its spill files are
/// discarded first); exhausted retries abort the phase with
/// [`EngineError::PhaseFailed`] and no partial output is reported.
pub struct Pipeline {
    inputs: Vec<String>,
    output: Option<String>,
    scratch_root: Option<String>,
    tasks: Option<usize>,
    num_reducers: Option<usize>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            inputs: vec![],
            output: None,
            scratch_root: None,
            tasks: None,
            num_reducers: None,
        }
    }

    pub fn add_input(&mut self, input_path: impl Into<String>) -> &mut Self {
        self.inputs.push(input_path.into());
        self
    }

    pub fn add_output(&mut self, output_path: impl Into<String>) -> &mut Self {
        self.output = Some(output_path.into());
        self
    }

    /// Overrides the `.skilja_runs` scratch location for intermediates.
    pub fn scratch_root(&mut self, path: impl Into<String>) -> &mut Self {
        self.scratch_root = Some(path.into());
        self
    }

    /// Caps the number of map tasks; defaults to `SKILJA_LOCAL_TASKS` or the
    /// CPU count. The final result never depends on this value.
    pub fn tasks(&mut self, tasks: Option<usize>) -> &mut Self {
        self.tasks = tasks;
        self
    }

    /// Sets the number of reduce partitions; defaults to
    /// `SKILJA_NUM_REDUCERS` or the map task count.
    pub fn reducers(&mut self, reducers: Option<usize>) -> &mut Self {
        self.num_reducers = reducers;
        self
    }

    pub fn run<M, C, R>(
        &mut self,
        mapper: M,
        combiner: C,
        reducer: R,
        stage: &'static str,
    ) -> Result<RunStats>
    where
        M: Mapper + Send + Sync,
        C: Combiner<Key = M::Key, Value = M::Value> + Send + Sync,
        R: Reducer<Key = M::Key, ValueIn = M::Value> + Send + Sync,
    {
        let output_dir = self.output.clone().context("output not set")?;
        let keep_intermediates = env_truthy(ENV_KEEP_INTERMEDIATES);

        // Scratch layout for this run
        let ts = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        let seq = RUN_SEQ.fetch_add(1, Ordering::Relaxed);
        let scratch = self.scratch_root.clone().unwrap_or_else(|| RUNS_ROOT.to_string());
        let launch_root = format!("{}/{}-{}-{}-{}", scratch, stage, std::process::id(), ts, seq);
        let map_out_dir = format!("{}/map_out", launch_root);
        let group_dir = format!("{}/grouped", launch_root);
        ensure_dir(&map_out_dir)?;
        ensure_dir(&group_dir)?;

        // Output directory is rebuilt from scratch on every run
        let _ = fs::remove_dir_all(&output_dir);
        ensure_dir(&output_dir)?;

        let mut all_files = Vec::new();
        for inp in &self.inputs {
            let mut files = list_files_recursive(inp)
                .with_context(|| format!("list input {}", inp))?;
            all_files.append(&mut files);
        }

        let tasks = self
            .tasks
            .or_else(|| env_usize(ENV_LOCAL_TASKS))
            .unwrap_or_else(num_cpus::get)
            .max(1)
            .min(all_files.len().max(1));
        let num_reducers = self
            .num_reducers
            .or_else(|| env_usize(ENV_NUM_REDUCERS))
            .unwrap_or(tasks)
            .max(1);
        let queue_cap = env_usize(ENV_WRITER_QUEUE_CAP).unwrap_or(DEFAULT_WRITER_QUEUE_CAP);
        let batch_bytes = env_usize(ENV_LOCAL_BATCH_BYTES).unwrap_or(DEFAULT_LOCAL_BATCH_BYTES);
        let buffer_records =
            env_usize(ENV_COMBINE_BUFFER_RECORDS).unwrap_or(DEFAULT_COMBINE_BUFFER_RECORDS);

        // Round-robin file assignment to map tasks
        let chunks: Vec<Vec<PathBuf>> = (0..tasks)
            .map(|i| {
                all_files
                    .iter()
                    .enumerate()
                    .filter(|(idx, _)| idx % tasks == i)
                    .map(|(_, p)| p.clone())
                    .collect()
            })
            .collect();

        info!(
            stage,
            tasks,
            num_reducers,
            input_files = all_files.len(),
            "pipeline starting map phase"
        );

        // ===== Map phase =====
        let retries = AtomicU64::new(0);
        let map_phase_start = Instant::now();
        let map_task_stats: Vec<MapTaskStats> = (0..tasks)
            .into_par_iter()
            .map(|task_id| {
                run_with_retries(stage, "map", task_id, &retries, || {
                    // Discard spill files from a failed earlier attempt
                    for part in 0..num_reducers {
                        let _ = fs::remove_file(partition_file(&map_out_dir, task_id, part));
                    }
                    run_map_task(
                        task_id,
                        &chunks[task_id],
                        &mapper,
                        &combiner,
                        &map_out_dir,
                        num_reducers,
                        queue_cap,
                        batch_bytes,
                        buffer_records,
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let map_wall_ms = map_phase_start.elapsed().as_millis() as u64;
        let map_retries = retries.load(Ordering::Relaxed);

        // ===== Shuffle phase (the barrier: every map task has joined its writer) =====
        let retries = AtomicU64::new(0);
        let shuffle_phase_start = Instant::now();
        let shuffle_task_stats: Vec<ShuffleTaskStats> = (0..num_reducers)
            .into_par_iter()
            .map(|r| {
                run_with_retries(stage, "shuffle", r, &retries, || {
                    run_shuffle_task(r, &map_out_dir, &group_dir)
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let shuffle_wall_ms = shuffle_phase_start.elapsed().as_millis() as u64;

        // ===== Reduce phase =====
        let retries = AtomicU64::new(0);
        let reduce_phase_start = Instant::now();
        let reduce_task_stats: Vec<ReduceTaskStats> = (0..num_reducers)
            .into_par_iter()
            .map(|r| {
                run_with_retries(stage, "reduce", r, &retries, || {
                    run_reduce_task(r, &group_dir, &output_dir, &reducer)
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let reduce_wall_ms = reduce_phase_start.elapsed().as_millis() as u64;

        if !keep_intermediates {
            let _ = fs::remove_dir_all(&launch_root);
        }

        let stats = RunStats {
            map: MapPhaseStats {
                tasks,
                total_emits: map_task_stats.iter().map(|s| s.emits).sum(),
                total_records_out: map_task_stats.iter().map(|s| s.records_out).sum(),
                total_bytes_out: map_task_stats.iter().map(|s| s.bytes_out).sum(),
                skipped_records: map_task_stats.iter().map(|s| s.skipped).sum(),
                retries: map_retries,
                min_task_ms: map_task_stats.iter().map(|s| s.wall_ms).min().unwrap_or(0),
                max_task_ms: map_task_stats.iter().map(|s| s.wall_ms).max().unwrap_or(0),
                wall_ms: map_wall_ms,
            },
            shuffle: ShufflePhaseStats {
                reducers: num_reducers,
                total_records: shuffle_task_stats.iter().map(|s| s.records).sum(),
                total_bytes: shuffle_task_stats.iter().map(|s| s.bytes).sum(),
                min_reducer_ms: shuffle_task_stats.iter().map(|s| s.wall_ms).min().unwrap_or(0),
                max_reducer_ms: shuffle_task_stats.iter().map(|s| s.wall_ms).max().unwrap_or(0),
                wall_ms: shuffle_wall_ms,
            },
            reduce: ReducePhaseStats {
                reducers: num_reducers,
                total_records: reduce_task_stats.iter().map(|s| s.records).sum(),
                total_groups: reduce_task_stats.iter().map(|s| s.groups).sum(),
                min_reducer_ms: reduce_task_stats.iter().map(|s| s.wall_ms).min().unwrap_or(0),
                max_reducer_ms: reduce_task_stats.iter().map(|s| s.wall_ms).max().unwrap_or(0),
                wall_ms: reduce_wall_ms,
            },
        };
        stats.log(stage);
        Ok(stats)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|v| v.parse::<usize>().ok())
}

fn env_truthy(name: &str) -> bool {
    match std::env::var(name) {
        Ok(v) => {
            let v = v.to_ascii_lowercase();
            v == "1" || v == "true" || v == "yes" || v == "on"
        }
        Err(_) => false,
    }
}

fn run_with_retries<T>(
    stage: &'static str,
    phase: &'static str,
    task: usize,
    retries: &AtomicU64,
    f: impl Fn() -> Result<T>,
) -> Result<T> {
    let mut last_err = None;
    for attempt in 1..=MAX_TASK_ATTEMPTS {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) => {
                warn!(stage, phase, task, attempt, error = %e, "task attempt failed");
                retries.fetch_add(1, Ordering::Relaxed);
                last_err = Some(e);
            }
        }
    }
    Err(EngineError::PhaseFailed {
        phase,
        task,
        attempts: MAX_TASK_ATTEMPTS,
        source: last_err.expect("at least one attempt ran"),
    }
    .into())
}

struct MapTaskStats {
    emits: u64,
    records_out: u64,
    bytes_out: u64,
    skipped: u64,
    wall_ms: u64,
}

struct ShuffleTaskStats {
    records: u64,
    bytes: u64,
    wall_ms: u64,
}

struct ReduceTaskStats {
    records: u64,
    groups: u64,
    wall_ms: u64,
}

/// Folds a map task's buffered emits through the combiner and spills the
/// framed records towards their reducer partitions.
fn flush_buffer<C: Combiner>(
    buffer: &mut HashMap<C::Key, Vec<C::Value>>,
    combiner: &C,
    chunks: &mut [Vec<u8>],
    writer: &TaskWriter,
    batch_bytes: usize,
    records_out: &mut u64,
) -> Result<()> {
    let num_partitions = chunks.len();
    for (key, values) in buffer.drain() {
        let values = combiner.combine(&key, values);
        let part = hash_to_partition(&key, num_partitions)?;
        let key_bytes = bincode::serialize(&key).context("serialize key")?;
        for v in values {
            let val_bytes = bincode::serialize(&v).context("serialize value")?;
            push_record(&mut chunks[part], &key_bytes, &val_bytes);
            *records_out += 1;
            if chunks[part].len() >= batch_bytes {
                let chunk = std::mem::replace(&mut chunks[part], Vec::with_capacity(batch_bytes));
                writer.send_chunk(part, chunk)?;
            }
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_map_task<M, C>(
    task_id: usize,
    files: &[PathBuf],
    mapper: &M,
    combiner: &C,
    map_out_dir: &str,
    num_reducers: usize,
    queue_cap: usize,
    batch_bytes: usize,
    buffer_records: usize,
) -> Result<MapTaskStats>
where
    M: Mapper,
    C: Combiner<Key = M::Key, Value = M::Value>,
{
    let task_start = Instant::now();
    let (writer, joiner) = TaskWriter::new(map_out_dir, task_id, num_reducers, queue_cap)?;

    let body = (|| -> Result<(u64, u64, u64)> {
        let mut buffer: HashMap<M::Key, Vec<M::Value>> = HashMap::new();
        let mut chunks: Vec<Vec<u8>> = (0..num_reducers)
            .map(|_| Vec::with_capacity(batch_bytes))
            .collect();
        let mut total_emits: u64 = 0;
        let mut records_out: u64 = 0;
        let mut skipped: u64 = 0;
        let mut buffered: usize = 0;
        let mut flush_err: Option<anyhow::Error> = None;

        for file in files {
            let lines = read_lines(file)?;
            let mut io_err: Option<anyhow::Error> = None;
            let map_result = {
                let mut emit = |k: M::Key, v: M::Value| {
                    if flush_err.is_some() {
                        return;
                    }
                    total_emits += 1;
                    buffer.entry(k).or_default().push(v);
                    buffered += 1;
                    if buffered >= buffer_records {
                        if let Err(e) = flush_buffer(
                            &mut buffer,
                            combiner,
                            &mut chunks,
                            &writer,
                            batch_bytes,
                            &mut records_out,
                        ) {
                            flush_err = Some(e);
                        }
                        buffered = 0;
                    }
                };
                mapper.do_map(
                    lines.filter_map(|r| match r {
                        Ok(line) => Some(line),
                        Err(e) => {
                            io_err = Some(e);
                            None
                        }
                    }),
                    &mut emit,
                )
            };
            if let Some(e) = io_err {
                return Err(e).with_context(|| format!("read {}", file.display()));
            }
            if let Some(e) = flush_err.take() {
                return Err(e);
            }
            skipped += map_result.with_context(|| format!("map {}", file.display()))?;
        }

        flush_buffer(
            &mut buffer,
            combiner,
            &mut chunks,
            &writer,
            batch_bytes,
            &mut records_out,
        )?;
        for (part, chunk) in chunks.iter_mut().enumerate() {
            if !chunk.is_empty() {
                writer.send_chunk(part, std::mem::take(chunk))?;
            }
        }
        Ok((total_emits, records_out, skipped))
    })();

    writer.close();
    let join_result = joiner.join();
    let (emits, records_out, skipped) = body?;
    join_result?;

    let stats = MapTaskStats {
        emits,
        records_out,
        bytes_out: writer.bytes_written(),
        skipped,
        wall_ms: task_start.elapsed().as_millis() as u64,
    };
    debug!(
        task_id,
        num_files = files.len(),
        emits = stats.emits,
        records_out = stats.records_out,
        bytes_out = stats.bytes_out,
        skipped = stats.skipped,
        "map task done"
    );
    Ok(stats)
}

pub(crate) fn grouped_file(group_dir: &str, partition: usize) -> String {
    format!("{}/grouped_part{}.bin", group_dir, partition)
}

/// Sorts one reducer partition's records by raw key bytes so equal keys are
/// adjacent, concatenating all map task spills into a single grouped run.
fn run_shuffle_task(r: usize, map_out_dir: &str, group_dir: &str) -> Result<ShuffleTaskStats> {
    let task_start = Instant::now();
    let pattern = format!("{}/task*_part{}.bin", map_out_dir, r);
    let mut paths = glob::glob(&pattern)
        .context("glob map output")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("walk map output")?;
    paths.sort();

    // Record index: (file_idx, record_start, key_end, record_end); key bytes
    // sit at [record_start + 8 .. key_end] behind the two u32 lengths.
    let mut file_maps: Vec<Mmap> = Vec::new();
    let mut index: Vec<(usize, usize, usize, usize)> = Vec::new();
    let mut records: u64 = 0;
    let mut bytes: u64 = 0;

    for p in &paths {
        let file = File::open(p).with_context(|| format!("open {}", p.display()))?;
        let len = file.metadata().with_context(|| format!("stat {}", p.display()))?.len();
        bytes += len;
        if len == 0 {
            continue;
        }
        let map = unsafe { Mmap::map(&file) }.with_context(|| format!("mmap {}", p.display()))?;
        let file_idx = file_maps.len();
        let buf = &map[..];
        let mut off = 0usize;
        while let Some((k, _v, next)) = read_record(buf, off) {
            index.push((file_idx, off, off + 8 + k.len(), next));
            records += 1;
            off = next;
        }
        file_maps.push(map);
    }

    index.par_sort_by(|a, b| {
        let (fia, sa, ka, _) = *a;
        let (fib, sb, kb, _) = *b;
        file_maps[fia][sa + 8..ka].cmp(&file_maps[fib][sb + 8..kb])
    });

    let out_path = grouped_file(group_dir, r);
    let mut w = open_writer(&out_path)?;
    for &(fi, s, _ke, e) in &index {
        w.write_all(&file_maps[fi][s..e])
            .with_context(|| format!("write {}", out_path))?;
    }
    w.flush().with_context(|| format!("flush {}", out_path))?;

    Ok(ShuffleTaskStats {
        records,
        bytes,
        wall_ms: task_start.elapsed().as_millis() as u64,
    })
}

fn reduce_group<R: Reducer>(
    reducer: &R,
    key: &R::Key,
    values: Vec<R::ValueIn>,
    out: &mut BufWriter<File>,
) -> Result<()> {
    let mut write_err: Option<anyhow::Error> = None;
    let mut emit = |line: String| {
        if write_err.is_some() {
            return;
        }
        if let Err(e) = writeln!(out, "{}", line) {
            write_err = Some(e.into());
        }
    };
    reducer.do_reduce(key, values, &mut emit)?;
    match write_err {
        Some(e) => Err(e.context("write reducer output")),
        None => Ok(()),
    }
}

/// Streams one grouped run, decoding records and handing each maximal run of
/// equal keys to the reducer.
fn run_reduce_task<R: Reducer>(
    r: usize,
    group_dir: &str,
    output_dir: &str,
    reducer: &R,
) -> Result<ReduceTaskStats> {
    let task_start = Instant::now();
    let in_path = grouped_file(group_dir, r);
    let mut out = open_writer(format!("{}/part-{:05}.tsv", output_dir, r))?;

    let mut records: u64 = 0;
    let mut groups: u64 = 0;

    let file = File::open(&in_path).with_context(|| format!("open {}", in_path))?;
    let len = file.metadata().with_context(|| format!("stat {}", in_path))?.len();
    if len > 0 {
        let map = unsafe { Mmap::map(&file) }.with_context(|| format!("mmap {}", in_path))?;
        let bytes = &map[..];

        let mut current_key: Option<R::Key> = None;
        let mut values: Vec<R::ValueIn> = Vec::new();
        let mut off = 0usize;
        while let Some((k, v, next)) = read_record(bytes, off) {
            let k_typed: R::Key = bincode::deserialize(k).context("decode grouped key")?;
            let v_typed: R::ValueIn = bincode::deserialize(v).context("decode grouped value")?;
            records += 1;
            match &current_key {
                Some(cur) if *cur == k_typed => values.push(v_typed),
                Some(_) => {
                    let key = current_key.take().expect("group key present");
                    reduce_group(reducer, &key, std::mem::take(&mut values), &mut out)?;
                    groups += 1;
                    current_key = Some(k_typed);
                    values.push(v_typed);
                }
                None => {
                    current_key = Some(k_typed);
                    values.push(v_typed);
                }
            }
            off = next;
        }
        if let Some(key) = current_key.take() {
            reduce_group(reducer, &key, std::mem::take(&mut values), &mut out)?;
            groups += 1;
        }
    }
    out.flush().context("flush reduce output")?;

    Ok(ReduceTaskStats {
        records,
        groups,
        wall_ms: task_start.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::IdentityCombiner;
    use std::io::Write as _;

    struct WcMapper;

    impl Mapper for WcMapper {
        type Key = String;
        type Value = u64;

        fn do_map<I, F>(&self, input: I, emit: &mut F) -> Result<u64>
        where
            I: IntoIterator<Item = String>,
            F: FnMut(Self::Key, Self::Value),
        {
            for line in input {
                for word in line.split_whitespace() {
                    emit(word.to_lowercase(), 1);
                }
            }
            Ok(0)
        }
    }

    struct SumCombiner;

    impl Combiner for SumCombiner {
        type Key = String;
        type Value = u64;

        fn combine(&self, _key: &String, values: Vec<u64>) -> Vec<u64> {
            vec![values.into_iter().sum()]
        }
    }

    struct WcReducer;

    impl Reducer for WcReducer {
        type Key = String;
        type ValueIn = u64;

        fn do_reduce<I, F>(&self, key: &Self::Key, values: I, emit: &mut F) -> Result<()>
        where
            I: IntoIterator<Item = Self::ValueIn>,
            F: FnMut(String),
        {
            let sum: u64 = values.into_iter().sum();
            emit(format!("{}\t{}", key, sum));
            Ok(())
        }
    }

    fn write_input(dir: &std::path::Path, name: &str, body: &str) {
        let mut f = File::create(dir.join(name)).unwrap();
        f.write_all(body.as_bytes()).unwrap();
    }

    fn collect_output(dir: &std::path::Path) -> Vec<String> {
        let mut lines = Vec::new();
        for path in list_files_recursive(dir).unwrap() {
            let body = std::fs::read_to_string(path).unwrap();
            lines.extend(body.lines().map(|l| l.to_string()));
        }
        lines.sort();
        lines
    }

    fn run_wordcount(tasks: usize, reducers: usize) -> Vec<String> {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("in");
        let output = root.path().join("out");
        std::fs::create_dir_all(&input).unwrap();
        write_input(&input, "a.txt", "the quick brown fox\nthe lazy dog\n");
        write_input(&input, "b.txt", "the dog barks\n");
        let mut pipeline = Pipeline::new();
        pipeline
            .add_input(input.to_str().unwrap())
            .add_output(output.to_str().unwrap())
            .scratch_root(root.path().join("scratch").to_str().unwrap())
            .tasks(Some(tasks))
            .reducers(Some(reducers));
        pipeline.run(WcMapper, SumCombiner, WcReducer, "wordcount").unwrap();
        collect_output(&output)
    }

    #[test]
    fn wordcount_end_to_end() {
        let lines = run_wordcount(2, 2);
        assert!(lines.contains(&"the\t3".to_string()));
        assert!(lines.contains(&"dog\t2".to_string()));
        assert!(lines.contains(&"fox\t1".to_string()));
    }

    #[test]
    fn result_is_independent_of_topology() {
        let base = run_wordcount(1, 1);
        assert_eq!(base, run_wordcount(2, 3));
        assert_eq!(base, run_wordcount(3, 2));
    }

    // Skips comment lines, and fails its first `failures_left` calls after
    // having already skipped them. Exercises the rule that only a successful
    // attempt's tallies reach the phase stats.
    struct FlakySkippingMapper {
        failures_left: AtomicU64,
    }

    impl Mapper for FlakySkippingMapper {
        type Key = String;
        type Value = u64;

        fn do_map<I, F>(&self, input: I, emit: &mut F) -> Result<u64>
        where
            I: IntoIterator<Item = String>,
            F: FnMut(Self::Key, Self::Value),
        {
            let mut skipped = 0;
            for line in input {
                if line.starts_with('#') {
                    skipped += 1;
                    continue;
                }
                for word in line.split_whitespace() {
                    emit(word.to_lowercase(), 1);
                }
            }
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                anyhow::bail!("transient failure");
            }
            Ok(skipped)
        }
    }

    #[test]
    fn skips_are_counted_once_across_task_retries() {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("in");
        let output = root.path().join("out");
        std::fs::create_dir_all(&input).unwrap();
        write_input(&input, "a.txt", "# header\nthe dog\nthe fox\n");
        let mut pipeline = Pipeline::new();
        pipeline
            .add_input(input.to_str().unwrap())
            .add_output(output.to_str().unwrap())
            .scratch_root(root.path().join("scratch").to_str().unwrap())
            .tasks(Some(1))
            .reducers(Some(1));
        let mapper = FlakySkippingMapper {
            failures_left: AtomicU64::new(1),
        };
        let stats = pipeline
            .run(mapper, SumCombiner, WcReducer, "wordcount")
            .unwrap();
        assert_eq!(stats.map.retries, 1);
        assert_eq!(stats.map.skipped_records, 1);
        assert!(collect_output(&output).contains(&"the\t2".to_string()));
    }

    #[test]
    fn identity_combiner_matches_summing_combiner() {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("in");
        let output = root.path().join("out");
        std::fs::create_dir_all(&input).unwrap();
        write_input(&input, "a.txt", "x y x\nx z\n");
        let mut pipeline = Pipeline::new();
        pipeline
            .add_input(input.to_str().unwrap())
            .add_output(output.to_str().unwrap())
            .scratch_root(root.path().join("scratch").to_str().unwrap())
            .tasks(Some(2))
            .reducers(Some(2));
        pipeline
            .run(WcMapper, IdentityCombiner::new(), WcReducer, "wordcount")
            .unwrap();
        let mut lines = collect_output(&output);
        lines.sort();
        assert_eq!(lines, vec!["x\t3", "y\t1", "z\t1"]);
    }
}
