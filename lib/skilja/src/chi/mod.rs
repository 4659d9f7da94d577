//! Per-category chi-squared term significance over a labeled document
//! corpus, run as two chained map-reduce passes.
//!
//! The counting pass tallies document presence per (category, term) pair
//! under two disjoint key spaces and reduces them into contingency cells;
//! the scoring pass regroups the cells by category, derives each pair's
//! complete (a, b, c, d) table, scores it and keeps the top terms per
//! category in a bounded heap. Rendering the final report is a separate,
//! computation-free step ([`report::write_report`]).

pub mod config;
pub mod contingency;
pub mod count;
pub mod model;
pub mod report;
pub mod score;
pub mod tokenize;

pub use config::{load_stopwords, EngineConfig};
pub use report::{write_report, ReportSummary};

use crate::api::IdentityCombiner;
use crate::io::{list_files_recursive, read_lines};
use crate::runtime::Pipeline;
use anyhow::Result;
use contingency::ContingencyReducer;
use count::{CountCombiner, CountMapper};
use model::Document;
use rayon::prelude::*;
use score::{CellMapper, ScoreReducer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Terms retained per category in the final ranking.
pub const TOP_TERMS_PER_CATEGORY: usize = 75;

#[derive(Debug, Clone)]
pub struct EngineOutcome {
    /// Malformed documents skipped during the counting pass.
    pub skipped_documents: u64,
    /// Stage directories under the work dir, `topk_dir` being the input for
    /// [`report::write_report`].
    pub cells_dir: String,
    pub topk_dir: String,
}

/// Per-category document counts plus the corpus total, gathered in a single
/// cheap pass. Used to derive N when the caller does not supply it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CorpusCensus {
    pub per_category: BTreeMap<String, u64>,
    pub total_docs: u64,
    pub skipped: u64,
}

pub fn count_documents(input: &str) -> Result<CorpusCensus> {
    let files = list_files_recursive(input)?;
    files
        .par_iter()
        .map(|file| -> Result<CorpusCensus> {
            let mut census = CorpusCensus::default();
            for line in read_lines(file)? {
                let line = line?;
                match serde_json::from_str::<Document>(&line) {
                    Ok(doc) => {
                        *census.per_category.entry(doc.category).or_default() += 1;
                        census.total_docs += 1;
                    }
                    Err(_) => census.skipped += 1,
                }
            }
            Ok(census)
        })
        .try_reduce(CorpusCensus::default, |mut acc, part| {
            for (category, n) in part.per_category {
                *acc.per_category.entry(category).or_default() += n;
            }
            acc.total_docs += part.total_docs;
            acc.skipped += part.skipped;
            Ok(acc)
        })
}

/// Runs both passes over the JSONL corpus under `input`, leaving stage
/// outputs beneath `work_dir`. The caller renders the report from
/// `topk_dir` afterwards.
pub fn run(input: &str, work_dir: &str, config: &EngineConfig) -> Result<EngineOutcome> {
    let cells_dir = format!("{}/cells", work_dir);
    let topk_dir = format!("{}/topk", work_dir);
    let scratch = format!("{}/scratch", work_dir);

    info!(
        total_docs = config.total_docs,
        top_terms = config.top_terms,
        stopwords = config.stopwords.len(),
        "engine starting"
    );

    let count_stats = Pipeline::new()
        .add_input(input)
        .add_output(cells_dir.as_str())
        .scratch_root(scratch.as_str())
        .tasks(config.tasks)
        .reducers(config.reducers)
        .run(
            CountMapper::new(Arc::clone(&config.stopwords)),
            CountCombiner,
            ContingencyReducer,
            "contingency",
        )?;

    Pipeline::new()
        .add_input(cells_dir.as_str())
        .add_output(topk_dir.as_str())
        .scratch_root(scratch.as_str())
        .tasks(config.tasks)
        .reducers(config.reducers)
        .run(
            CellMapper,
            IdentityCombiner::new(),
            ScoreReducer::new(config.total_docs, config.top_terms),
            "scoring",
        )?;

    let outcome = EngineOutcome {
        skipped_documents: count_stats.map.skipped_records,
        cells_dir,
        topk_dir,
    };
    info!(
        skipped_documents = outcome.skipped_documents,
        "engine finished"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn census_counts_per_category_and_skips_malformed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("part0.jsonl"),
            concat!(
                r#"{"category":"A","reviewText":"one"}"#,
                "\n",
                r#"{"category":"B","reviewText":"two"}"#,
                "\n",
                "garbage\n",
            ),
        )
        .unwrap();
        fs::write(
            dir.path().join("part1.jsonl"),
            concat!(r#"{"category":"A","reviewText":"three"}"#, "\n"),
        )
        .unwrap();
        fs::write(dir.path().join("part2.jsonl"), [0xff, 0xfe, b'\n']).unwrap();
        let census = count_documents(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(census.total_docs, 3);
        assert_eq!(census.skipped, 2);
        assert_eq!(census.per_category.get("A"), Some(&2));
        assert_eq!(census.per_category.get("B"), Some(&1));
    }
}
