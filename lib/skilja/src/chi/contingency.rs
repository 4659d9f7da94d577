use crate::api::Reducer;
use crate::chi::model::{Cell, CellRecord, CountValue, Key};
use anyhow::{bail, Context, Result};
use std::collections::HashMap;

/// Stage-1 reducer: builds contingency cells once the shuffle has delivered
/// every partial count for a key.
///
/// Category keys carry the doc-count marker and per-term presence counts, so
/// this branch can emit A (`a = docs in category with term`) and
/// C (`c = |category| - a`). Term keys carry per-category presence counts,
/// whose total across categories yields B (`b = total - per-category count`)
/// for every category the term co-occurs with. Output records are re-keyed by
/// category in the second shuffle.
pub struct ContingencyReducer;

fn emit_record<F: FnMut(String)>(record: &CellRecord, emit: &mut F) -> Result<()> {
    emit(serde_json::to_string(record).context("encode cell record")?);
    Ok(())
}

impl Reducer for ContingencyReducer {
    type Key = Key;
    type ValueIn = CountValue;

    fn do_reduce<I, F>(&self, key: &Self::Key, values: I, emit: &mut F) -> Result<()>
    where
        I: IntoIterator<Item = Self::ValueIn>,
        F: FnMut(String),
    {
        match key {
            Key::Category(category) => {
                let mut category_size: u64 = 0;
                let mut per_term: HashMap<String, u64> = HashMap::new();
                for v in values {
                    match v {
                        CountValue::Docs(n) => category_size += n,
                        CountValue::TermDocs(term, n) => *per_term.entry(term).or_default() += n,
                        // The key spaces are disjoint; a crossed value means
                        // the shuffle delivered a corrupted group.
                        CountValue::CategoryDocs(..) => {
                            bail!("term-stream value under category key {category}")
                        }
                    }
                }
                for (term, a) in per_term {
                    emit_record(
                        &CellRecord {
                            category: category.clone(),
                            cell: Cell::A,
                            term: term.clone(),
                            value: a,
                        },
                        emit,
                    )?;
                    emit_record(
                        &CellRecord {
                            category: category.clone(),
                            cell: Cell::C,
                            term,
                            value: category_size.saturating_sub(a),
                        },
                        emit,
                    )?;
                }
            }
            Key::Term(term) => {
                let mut per_category: HashMap<String, u64> = HashMap::new();
                let mut total: u64 = 0;
                for v in values {
                    match v {
                        CountValue::CategoryDocs(category, n) => {
                            *per_category.entry(category).or_default() += n;
                            total += n;
                        }
                        _ => bail!("category-stream value under term key {term}"),
                    }
                }
                for (category, count) in per_category {
                    emit_record(
                        &CellRecord {
                            category,
                            cell: Cell::B,
                            term: term.clone(),
                            value: total - count,
                        },
                        emit,
                    )?;
                }
            }
        }
        Ok(())
    }
}
