use crate::chi::model::CategoryTopTerms;
use crate::io::{list_files_recursive, read_lines};
use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

#[derive(Debug, Clone, Default)]
pub struct ReportSummary {
    pub categories: usize,
    pub vocabulary: usize,
}

/// Renders the scoring stage's output: one line per category, alphabetical,
/// of the form `<CATEGORY> term1:score1 ... termK:scoreK` (scores in their
/// exact float representation), followed by one line with the alphabetical
/// union of every term that made any category's list. Pure serialization; the
/// per-category term order was fixed by the scorer.
pub fn write_report(topk_dir: &str, out: &mut impl Write) -> Result<ReportSummary> {
    let mut by_category: BTreeMap<String, Vec<(String, f64)>> = BTreeMap::new();
    let mut vocabulary: BTreeSet<String> = BTreeSet::new();

    for path in list_files_recursive(topk_dir)? {
        for line in read_lines(&path)? {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let record: CategoryTopTerms = serde_json::from_str(&line)
                .with_context(|| format!("parse top-terms record in {}", path.display()))?;
            by_category.insert(record.category, record.terms);
        }
    }

    for (category, terms) in &by_category {
        write!(out, "<{}>", category)?;
        for (term, score) in terms {
            vocabulary.insert(term.clone());
            write!(out, " {}:{}", term, score)?;
        }
        writeln!(out)?;
    }

    let joined: Vec<&str> = vocabulary.iter().map(|s| s.as_str()).collect();
    writeln!(out, "{}", joined.join(" "))?;

    Ok(ReportSummary {
        categories: by_category.len(),
        vocabulary: vocabulary.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_part(dir: &std::path::Path, name: &str, records: &[CategoryTopTerms]) {
        let body: String = records
            .iter()
            .map(|r| serde_json::to_string(r).unwrap() + "\n")
            .collect();
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn categories_sort_alphabetically_and_vocabulary_is_the_union() {
        let dir = tempfile::tempdir().unwrap();
        write_part(
            dir.path(),
            "part-00000.tsv",
            &[CategoryTopTerms {
                category: "Music".into(),
                terms: vec![("loud".into(), 2.5), ("bass".into(), 1.0)],
            }],
        );
        write_part(
            dir.path(),
            "part-00001.tsv",
            &[CategoryTopTerms {
                category: "Books".into(),
                terms: vec![("plot".into(), 3.0), ("bass".into(), 0.5)],
            }],
        );

        let mut buf = Vec::new();
        let summary = write_report(dir.path().to_str().unwrap(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "<Books> plot:3 bass:0.5");
        assert_eq!(lines[1], "<Music> loud:2.5 bass:1");
        // union of both lists, no more, no fewer
        assert_eq!(lines[2], "bass loud plot");
        assert_eq!(summary.categories, 2);
        assert_eq!(summary.vocabulary, 3);
    }

    #[test]
    fn empty_output_dir_yields_only_the_vocabulary_line() {
        let dir = tempfile::tempdir().unwrap();
        let mut buf = Vec::new();
        let summary = write_report(dir.path().to_str().unwrap(), &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "\n");
        assert_eq!(summary.categories, 0);
    }
}
