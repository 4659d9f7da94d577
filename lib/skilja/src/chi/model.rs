use serde::{Deserialize, Serialize};

/// One corpus record. Anything that fails to parse into this shape is a
/// malformed document: skipped and counted, never fatal.
#[derive(Deserialize, Debug)]
pub struct Document {
    pub category: String,
    #[serde(rename = "reviewText")]
    pub review_text: String,
}

/// Shuffle key for the counting stage. Category keys and term keys are
/// disjoint by construction, so the two aggregation streams can never collide
/// even if a category string equals a term string.
#[derive(Serialize, Deserialize, Clone, Debug, Hash, PartialEq, Eq)]
pub enum Key {
    Category(String),
    Term(String),
}

/// Partial counts flowing into the first shuffle. `Docs` rides under a
/// category key; `TermDocs` counts documents of the keyed category containing
/// the named term; `CategoryDocs` counts documents of the named category
/// containing the keyed term. All are document-presence counts: a document
/// contributes at most 1 per (category, term) pair however often the term
/// repeats in its text.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CountValue {
    Docs(u64),
    TermDocs(String, u64),
    CategoryDocs(String, u64),
}

/// Which contingency cell a [`CellRecord`] carries. `D` is never
/// materialized; the scorer derives it as `N - a - b - c`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cell {
    /// Documents in the category containing the term.
    A,
    /// Documents outside the category containing the term.
    B,
    /// Documents in the category not containing the term.
    C,
}

impl Cell {
    pub fn index(self) -> usize {
        match self {
            Cell::A => 0,
            Cell::B => 1,
            Cell::C => 2,
        }
    }
}

/// Contingency cell for one (category, term) pair, the JSONL record between
/// the two stages.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CellRecord {
    pub category: String,
    pub cell: Cell,
    pub term: String,
    pub value: u64,
}

/// A cell record stripped of its category once the second shuffle has keyed
/// on it.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CellUpdate {
    pub cell: Cell,
    pub term: String,
    pub value: u64,
}

/// Final per-category ranking, one JSONL record per category out of the
/// scoring stage. `terms` is sorted by score descending, ties by term
/// ascending.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CategoryTopTerms {
    pub category: String,
    pub terms: Vec<(String, f64)>,
}
