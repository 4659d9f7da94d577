use crate::api::{Mapper, Reducer};
use crate::chi::model::{CategoryTopTerms, CellRecord, CellUpdate};
use anyhow::{Context, Result};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

/// The chi-squared independence statistic for one (category, term)
/// contingency table, with `d` derived from the corpus size. Degenerate
/// tables (any zero marginal) carry no discriminative signal and score 0
/// instead of dividing by zero.
pub fn chi_squared(n: u64, a: u64, b: u64, c: u64) -> f64 {
    let Some(d) = n.checked_sub(a + b + c) else {
        // a+b+c can only exceed N when the configured N is wrong; treat the
        // table as degenerate rather than producing a negative cell.
        return 0.0;
    };
    let (n, a, b, c, d) = (n as f64, a as f64, b as f64, c as f64, d as f64);
    let denominator = (a + b) * (a + c) * (b + d) * (c + d);
    if denominator == 0.0 {
        return 0.0;
    }
    n * (a * d - b * c).powi(2) / denominator
}

/// Stage-2 mapper: re-keys the contingency cell records by category so the
/// scorer sees every cell relevant to a category in one group.
pub struct CellMapper;

impl Mapper for CellMapper {
    type Key = String;
    type Value = CellUpdate;

    fn do_map<I, F>(&self, input: I, emit: &mut F) -> Result<u64>
    where
        I: IntoIterator<Item = String>,
        F: FnMut(Self::Key, Self::Value),
    {
        for line in input {
            // Stage-1 wrote these records itself; a parse failure means a
            // corrupted intermediate, not user input. Fail the task so the
            // run never proceeds on a diluted cell set.
            let rec: CellRecord =
                serde_json::from_str(&line).context("decode contingency cell record")?;
            emit(
                rec.category,
                CellUpdate {
                    cell: rec.cell,
                    term: rec.term,
                    value: rec.value,
                },
            );
        }
        Ok(0)
    }
}

// Ranking order: higher score first, ties broken by lexicographically
// smaller term. `cmp` returns Greater for the better-ranked entry so a
// `Reverse` wrap turns BinaryHeap into keep-the-best-K.
struct Ranked {
    score: f64,
    term: String,
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.term.cmp(&self.term))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

/// Stage-2 reducer: accumulates each term's (a, b, c) cells for the grouped
/// category, then at finalization derives `d`, scores every term and keeps
/// the `keep` best in a bounded min-heap. Terms are visited in ascending
/// order at finalization so selection and tie-breaking never depend on
/// arrival order.
pub struct ScoreReducer {
    total_docs: u64,
    keep: usize,
}

impl ScoreReducer {
    pub fn new(total_docs: u64, keep: usize) -> Self {
        Self { total_docs, keep }
    }
}

impl Reducer for ScoreReducer {
    type Key = String;
    type ValueIn = CellUpdate;

    fn do_reduce<I, F>(&self, key: &Self::Key, values: I, emit: &mut F) -> Result<()>
    where
        I: IntoIterator<Item = Self::ValueIn>,
        F: FnMut(String),
    {
        let mut tables: HashMap<String, [u64; 3]> = HashMap::new();
        for update in values {
            tables.entry(update.term).or_default()[update.cell.index()] += update.value;
        }
        if tables.is_empty() {
            return Ok(());
        }

        let mut terms: Vec<(String, [u64; 3])> = tables.into_iter().collect();
        terms.sort_by(|x, y| x.0.cmp(&y.0));

        let mut heap: BinaryHeap<Reverse<Ranked>> = BinaryHeap::with_capacity(self.keep + 1);
        for (term, [a, b, c]) in terms {
            let score = chi_squared(self.total_docs, a, b, c);
            heap.push(Reverse(Ranked { score, term }));
            if heap.len() > self.keep {
                heap.pop();
            }
        }

        let mut ranked: Vec<Ranked> = heap.into_iter().map(|r| r.0).collect();
        ranked.sort_by(|x, y| y.cmp(x));
        let record = CategoryTopTerms {
            category: key.clone(),
            terms: ranked.into_iter().map(|r| (r.term, r.score)).collect(),
        };
        emit(serde_json::to_string(&record).context("encode top terms record")?);
        Ok(())
    }
}
