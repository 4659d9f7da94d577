use crate::api::{Combiner, Mapper};
use crate::chi::model::{CountValue, Document, Key};
use crate::chi::tokenize::Tokenizer;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Stage-1 mapper: the per-partition local aggregator. For every document it
/// emits one doc-count marker under the category key, and for every unique
/// term one presence count under the category key and one under the term key.
/// Malformed records (invalid JSON, missing fields, mangled encoding) are
/// skipped and reported through the call's return value.
pub struct CountMapper {
    tokenizer: Tokenizer,
}

impl CountMapper {
    pub fn new(stopwords: Arc<std::collections::HashSet<String>>) -> Self {
        Self {
            tokenizer: Tokenizer::new(stopwords),
        }
    }
}

impl Mapper for CountMapper {
    type Key = Key;
    type Value = CountValue;

    fn do_map<I, F>(&self, input: I, emit: &mut F) -> Result<u64>
    where
        I: IntoIterator<Item = String>,
        F: FnMut(Self::Key, Self::Value),
    {
        let mut skipped: u64 = 0;
        for line in input {
            let doc: Document = match serde_json::from_str(&line) {
                Ok(doc) => doc,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };
            emit(Key::Category(doc.category.clone()), CountValue::Docs(1));
            for term in self.tokenizer.unique_terms(&doc.review_text) {
                emit(
                    Key::Category(doc.category.clone()),
                    CountValue::TermDocs(term.clone(), 1),
                );
                emit(
                    Key::Term(term),
                    CountValue::CategoryDocs(doc.category.clone(), 1),
                );
            }
        }
        Ok(skipped)
    }
}

/// Pre-shuffle summing of a key's partial counts. Associative and applied an
/// arbitrary number of times; the contingency reducer re-sums whatever
/// arrives, so this only shrinks shuffle volume.
pub struct CountCombiner;

impl Combiner for CountCombiner {
    type Key = Key;
    type Value = CountValue;

    fn combine(&self, _key: &Key, values: Vec<CountValue>) -> Vec<CountValue> {
        let mut docs: u64 = 0;
        let mut term_docs: HashMap<String, u64> = HashMap::new();
        let mut category_docs: HashMap<String, u64> = HashMap::new();
        for v in values {
            match v {
                CountValue::Docs(n) => docs += n,
                CountValue::TermDocs(term, n) => *term_docs.entry(term).or_default() += n,
                CountValue::CategoryDocs(cat, n) => *category_docs.entry(cat).or_default() += n,
            }
        }
        let mut out = Vec::with_capacity(1 + term_docs.len() + category_docs.len());
        if docs > 0 {
            out.push(CountValue::Docs(docs));
        }
        out.extend(term_docs.into_iter().map(|(t, n)| CountValue::TermDocs(t, n)));
        out.extend(
            category_docs
                .into_iter()
                .map(|(c, n)| CountValue::CategoryDocs(c, n)),
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn map_lines(lines: &[&str]) -> (Vec<(Key, CountValue)>, u64) {
        let mapper = CountMapper::new(Arc::new(HashSet::new()));
        let mut emitted = Vec::new();
        let skipped = mapper
            .do_map(
                lines.iter().map(|l| l.to_string()),
                &mut |k, v| emitted.push((k, v)),
            )
            .unwrap();
        (emitted, skipped)
    }

    #[test]
    fn emits_presence_counts_under_both_key_spaces() {
        let (emitted, skipped) =
            map_lines(&[r#"{"category":"Books","reviewText":"great great story"}"#]);
        assert_eq!(skipped, 0);
        assert!(emitted.contains(&(Key::Category("Books".into()), CountValue::Docs(1))));
        // "great" repeats in the text but is emitted once per key space
        let great_cat = emitted
            .iter()
            .filter(|(k, v)| {
                *k == Key::Category("Books".into())
                    && *v == CountValue::TermDocs("great".into(), 1)
            })
            .count();
        assert_eq!(great_cat, 1);
        let great_term = emitted
            .iter()
            .filter(|(k, v)| {
                *k == Key::Term("great".into())
                    && *v == CountValue::CategoryDocs("Books".into(), 1)
            })
            .count();
        assert_eq!(great_term, 1);
        // one doc marker + (category + term) emission per unique term
        assert_eq!(emitted.len(), 1 + 2 * 2);
    }

    #[test]
    fn malformed_documents_are_skipped_and_counted() {
        let (emitted, skipped) = map_lines(&[
            "not json at all",
            r#"{"category":"Books"}"#,
            r#"{"reviewText":"no category"}"#,
            r#"{"category":"Books","reviewText":"fine"}"#,
        ]);
        assert_eq!(skipped, 3);
        assert!(emitted.contains(&(Key::Category("Books".into()), CountValue::Docs(1))));
    }

    #[test]
    fn combiner_sums_each_payload_independently() {
        let key = Key::Category("Books".into());
        let values = vec![
            CountValue::Docs(1),
            CountValue::TermDocs("great".into(), 1),
            CountValue::Docs(1),
            CountValue::TermDocs("great".into(), 1),
            CountValue::TermDocs("story".into(), 1),
        ];
        let mut combined = CountCombiner.combine(&key, values);
        combined.sort_by_key(|v| format!("{:?}", v));
        assert_eq!(
            combined,
            vec![
                CountValue::Docs(2),
                CountValue::TermDocs("great".into(), 2),
                CountValue::TermDocs("story".into(), 1),
            ]
        );
    }

    #[test]
    fn combiner_is_idempotent_on_its_own_output() {
        let key = Key::Term("great".into());
        let values = vec![
            CountValue::CategoryDocs("Books".into(), 3),
            CountValue::CategoryDocs("Music".into(), 1),
            CountValue::CategoryDocs("Books".into(), 2),
        ];
        let once = CountCombiner.combine(&key, values);
        let mut twice = CountCombiner.combine(&key, once.clone());
        let mut once = once;
        once.sort_by_key(|v| format!("{:?}", v));
        twice.sort_by_key(|v| format!("{:?}", v));
        assert_eq!(once, twice);
    }
}
