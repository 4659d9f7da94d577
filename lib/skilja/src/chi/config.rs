use crate::error::EngineError;
use anyhow::Result;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Read-only configuration shared by every worker. Built once before any
/// processing; workers receive it by reference and never mutate it.
#[derive(Clone)]
pub struct EngineConfig {
    pub stopwords: Arc<HashSet<String>>,
    /// Total document count N across the whole corpus. The chi-squared
    /// statistic is only exact when this equals the number of documents
    /// actually streamed.
    pub total_docs: u64,
    /// Terms retained per category.
    pub top_terms: usize,
    pub tasks: Option<usize>,
    pub reducers: Option<usize>,
}

impl EngineConfig {
    pub fn new(stopwords: HashSet<String>, total_docs: u64) -> Result<Self> {
        if total_docs == 0 {
            return Err(EngineError::config("total document count must be positive").into());
        }
        Ok(Self {
            stopwords: Arc::new(stopwords),
            total_docs,
            top_terms: super::TOP_TERMS_PER_CATEGORY,
            tasks: None,
            reducers: None,
        })
    }

    pub fn top_terms(mut self, top_terms: usize) -> Self {
        self.top_terms = top_terms;
        self
    }

    pub fn tasks(mut self, tasks: Option<usize>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn reducers(mut self, reducers: Option<usize>) -> Self {
        self.reducers = reducers;
        self
    }
}

/// Loads a line-delimited stopword list, lower-casing each entry. A missing
/// or unreadable file is a configuration error: it aborts before processing.
pub fn load_stopwords(path: impl AsRef<Path>) -> Result<HashSet<String>> {
    let body = fs::read_to_string(path.as_ref()).map_err(|e| {
        EngineError::config(format!("stopword list {}: {}", path.as_ref().display(), e))
    })?;
    Ok(body
        .lines()
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .collect())
}
