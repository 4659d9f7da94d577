use crate::io::open_writer;
use anyhow::{anyhow, Context, Result};
use crossbeam_channel as channel;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

/// Writes the shuffle files of one map task: a dedicated IO thread owns one
/// buffered writer per reducer partition, fed over a bounded channel for
/// backpressure. Keeping the files per task (rather than shared across tasks)
/// means a failed task's output can be discarded and the task re-run without
/// contaminating the shuffle.
pub struct TaskWriter {
    sender: channel::Sender<WriterMsg>,
    counters: Arc<WriterCounters>,
}

#[derive(Default)]
pub struct WriterCounters {
    pub bytes_written: AtomicU64,
    pub chunks: AtomicU64,
}

enum WriterMsg {
    Chunk(usize, Vec<u8>),
    Close,
}

pub struct WriterJoiner {
    handle: Option<thread::JoinHandle<Result<()>>>,
}

impl WriterJoiner {
    /// Waits for the IO thread and surfaces any write error so the owning
    /// task can be retried.
    pub fn join(mut self) -> Result<()> {
        match self.handle.take() {
            Some(h) => h.join().map_err(|_| anyhow!("writer thread panicked"))?,
            None => Ok(()),
        }
    }
}

pub fn partition_file(map_out_dir: &str, task_id: usize, partition: usize) -> String {
    format!("{}/task{}_part{}.bin", map_out_dir, task_id, partition)
}

impl TaskWriter {
    pub fn new(
        map_out_dir: &str,
        task_id: usize,
        num_partitions: usize,
        queue_cap: usize,
    ) -> Result<(Self, WriterJoiner)> {
        let (tx, rx) = channel::bounded::<WriterMsg>(queue_cap);
        let counters = Arc::new(WriterCounters::default());
        let thread_counters = Arc::clone(&counters);
        let paths: Vec<String> = (0..num_partitions)
            .map(|p| partition_file(map_out_dir, task_id, p))
            .collect();
        let handle = thread::spawn(move || -> Result<()> {
            // Writers are opened lazily: small corpora touch few partitions.
            let mut writers: Vec<Option<BufWriter<File>>> = (0..paths.len()).map(|_| None).collect();
            loop {
                match rx.recv() {
                    Ok(WriterMsg::Chunk(part, bytes)) => {
                        let w = match &mut writers[part] {
                            Some(w) => w,
                            None => {
                                writers[part] = Some(open_writer(&paths[part])?);
                                writers[part].as_mut().unwrap()
                            }
                        };
                        w.write_all(&bytes)
                            .with_context(|| format!("write {}", paths[part]))?;
                        thread_counters
                            .bytes_written
                            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
                        thread_counters.chunks.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(WriterMsg::Close) | Err(_) => break,
                }
            }
            for (part, w) in writers.iter_mut().enumerate() {
                if let Some(w) = w {
                    w.flush().with_context(|| format!("flush {}", paths[part]))?;
                }
            }
            Ok(())
        });
        Ok((
            Self { sender: tx, counters },
            WriterJoiner { handle: Some(handle) },
        ))
    }

    pub fn send_chunk(&self, partition: usize, bytes: Vec<u8>) -> Result<()> {
        self.sender
            .send(WriterMsg::Chunk(partition, bytes))
            .map_err(|e| anyhow!("writer channel closed: {}", e))
    }

    pub fn close(&self) {
        let _ = self.sender.send(WriterMsg::Close);
    }

    pub fn bytes_written(&self) -> u64 {
        self.counters.bytes_written.load(Ordering::Relaxed)
    }

    pub fn chunks_written(&self) -> u64 {
        self.counters.chunks.load(Ordering::Relaxed)
    }
}
