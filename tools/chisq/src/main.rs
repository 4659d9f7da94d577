use anyhow::Result;
use clap::Parser;
use skilja::chi::{self, EngineConfig};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
struct Args {
    /// Directory (or single file) of JSONL review records with "category"
    /// and "reviewText" fields
    #[arg(long)]
    input: String,
    /// Line-delimited stopword list, matched case-insensitively
    #[arg(long)]
    stopwords: PathBuf,
    /// Work directory for stage outputs
    #[arg(long)]
    output: String,
    /// Total document count N; derived by a counting pass when omitted
    #[arg(long)]
    total_docs: Option<u64>,
    /// Terms retained per category
    #[arg(long, default_value_t = chi::TOP_TERMS_PER_CATEGORY)]
    top_terms: usize,
    /// Number of map tasks (defaults to the CPU count)
    #[arg(long)]
    tasks: Option<usize>,
    /// Number of reduce partitions
    #[arg(long)]
    reducers: Option<usize>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let stopwords = chi::load_stopwords(&args.stopwords)?;
    let total_docs = match args.total_docs {
        Some(n) => n,
        None => {
            let census = chi::count_documents(&args.input)?;
            info!(
                total_docs = census.total_docs,
                categories = census.per_category.len(),
                skipped = census.skipped,
                "census pass complete"
            );
            skilja::io::ensure_dir(&args.output)?;
            let census_path = format!("{}/category_counts.json", args.output);
            std::fs::write(&census_path, serde_json::to_vec_pretty(&census)?)?;
            census.total_docs
        }
    };

    let config = EngineConfig::new(stopwords, total_docs)?
        .top_terms(args.top_terms)
        .tasks(args.tasks)
        .reducers(args.reducers);
    let outcome = chi::run(&args.input, &args.output, &config)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let summary = chi::write_report(&outcome.topk_dir, &mut out)?;
    out.flush()?;
    info!(
        categories = summary.categories,
        vocabulary = summary.vocabulary,
        skipped_documents = outcome.skipped_documents,
        "report written"
    );
    Ok(())
}
