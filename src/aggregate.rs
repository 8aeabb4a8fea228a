//! Score aggregator: collapses the per-triplet analysis table into one
//! scalar percentage per task.
//!
//! The collapse is a two-level grouped mean, context first and phone pair
//! second, never a flat mean over all rows. With unequal group sizes a flat
//! mean would let over-represented contexts or phone pairs dominate the
//! result.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use crate::error::AggregateError;
use crate::storage;

/// Supported task topologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    /// `by` encodes a `('talker', 'context')` pair.
    Within,
    /// `by` is the context directly; there is no talker axis.
    Across,
}

impl FromStr for TaskType {
    type Err = AggregateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "within" => Ok(TaskType::Within),
            "across" => Ok(TaskType::Across),
            other => Err(AggregateError::UnknownTaskType(other.to_string())),
        }
    }
}

/// One row of the analysis table. `score` is an error rate in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRow {
    pub phone_1: String,
    pub phone_2: String,
    pub by: String,
    pub score: f64,
}

/// Collapses analysis rows into the final percentage.
///
/// The task type string is parsed before any row is touched, so an unknown
/// type never performs partial computation. For `within` tasks each `by`
/// value must decode as a `('talker', 'context')` pair; a decode failure is
/// fatal, not skipped.
///
/// # Errors
///
/// Returns [`AggregateError::UnknownTaskType`], [`AggregateError::MalformedBy`]
/// or [`AggregateError::EmptyTable`].
pub fn aggregate(rows: &[AnalysisRow], task_type: &str) -> Result<f64, AggregateError> {
    let task_type: TaskType = task_type.parse()?;
    if rows.is_empty() {
        return Err(AggregateError::EmptyTable);
    }

    // First collapse: mean score per (context, phone_1, phone_2), which
    // discards the talker axis for within tasks.
    let mut per_context: BTreeMap<(String, String, String), (f64, usize)> = BTreeMap::new();
    for row in rows {
        let context = match task_type {
            TaskType::Across => row.by.clone(),
            TaskType::Within => decode_talker_context(&row.by)?.1,
        };
        let entry = per_context
            .entry((context, row.phone_1.clone(), row.phone_2.clone()))
            .or_insert((0.0, 0));
        entry.0 += row.score;
        entry.1 += 1;
    }

    // Second collapse: mean over contexts per phone pair.
    let mut per_pair: BTreeMap<(String, String), (f64, usize)> = BTreeMap::new();
    for ((_, phone_1, phone_2), (sum, n)) in per_context {
        let entry = per_pair.entry((phone_1, phone_2)).or_insert((0.0, 0));
        entry.0 += sum / n as f64;
        entry.1 += 1;
    }

    let overall: f64 = per_pair
        .values()
        .map(|(sum, n)| sum / *n as f64)
        .sum::<f64>()
        / per_pair.len() as f64;

    Ok((1.0 - overall) * 100.0)
}

/// Reads an analysis artifact (completion footer stripped) and aggregates it.
pub fn aggregate_file(path: &Path, task_type: &str) -> Result<f64, AggregateError> {
    let payload = storage::read_payload(path)?;
    let text = String::from_utf8_lossy(&payload);
    let rows = parse_table(&text)?;
    aggregate(&rows, task_type)
}

/// Parses the tab-separated analysis table. The header names the columns;
/// `phone_1`, `phone_2`, `by` and `score` must all be present.
pub fn parse_table(text: &str) -> Result<Vec<AnalysisRow>, AggregateError> {
    let mut lines = text.lines().enumerate();
    let (_, header) = lines.next().ok_or(AggregateError::EmptyTable)?;
    let columns: Vec<&str> = header.split('\t').collect();

    let index_of = |name: &str| {
        columns
            .iter()
            .position(|c| *c == name)
            .ok_or_else(|| AggregateError::MalformedRow {
                line: 1,
                message: format!("missing column '{name}'"),
            })
    };
    let (ip1, ip2, iby, iscore) = (
        index_of("phone_1")?,
        index_of("phone_2")?,
        index_of("by")?,
        index_of("score")?,
    );

    let mut rows = Vec::new();
    for (idx, line) in lines {
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != columns.len() {
            return Err(AggregateError::MalformedRow {
                line: idx + 1,
                message: format!("expected {} fields, got {}", columns.len(), fields.len()),
            });
        }
        let score: f64 = fields[iscore]
            .parse()
            .map_err(|_| AggregateError::MalformedRow {
                line: idx + 1,
                message: format!("bad score '{}'", fields[iscore]),
            })?;
        rows.push(AnalysisRow {
            phone_1: fields[ip1].to_string(),
            phone_2: fields[ip2].to_string(),
            by: fields[iby].to_string(),
            score,
        });
    }
    Ok(rows)
}

/// Decodes a `('talker', 'context')` tuple literal, the format the analyze
/// stage uses for the grouping key of within tasks.
fn decode_talker_context(by: &str) -> Result<(String, String), AggregateError> {
    let malformed = |message: &str| AggregateError::MalformedBy {
        value: by.to_string(),
        message: message.to_string(),
    };

    let inner = by
        .trim()
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| malformed("expected a parenthesized pair"))?;

    let (talker, rest) = take_quoted(inner).ok_or_else(|| malformed("expected quoted talker"))?;
    let rest = rest
        .trim_start()
        .strip_prefix(',')
        .ok_or_else(|| malformed("expected ',' between talker and context"))?;
    let (context, rest) =
        take_quoted(rest.trim_start()).ok_or_else(|| malformed("expected quoted context"))?;
    if !rest.trim().is_empty() {
        return Err(malformed("trailing data after context"));
    }
    Ok((talker, context))
}

/// Takes one single- or double-quoted string off the front of `s`.
fn take_quoted(s: &str) -> Option<(String, &str)> {
    let mut chars = s.char_indices();
    let (_, quote) = chars.next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }
    for (i, c) in chars {
        if c == quote {
            return Some((s[1..i].to_string(), &s[i + quote.len_utf8()..]));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(p1: &str, p2: &str, by: &str, score: f64) -> AnalysisRow {
        AnalysisRow {
            phone_1: p1.to_string(),
            phone_2: p2.to_string(),
            by: by.to_string(),
            score,
        }
    }

    #[test]
    fn test_aggregate_within_two_level_mean() {
        let rows = vec![
            row("x", "y", "('t1', 'A')", 0.2),
            row("x", "y", "('t2', 'A')", 0.4),
            row("x", "y", "('t1', 'B')", 1.0),
        ];
        // Context means: A = 0.3, B = 1.0; pair mean = 0.65; (1 - 0.65) * 100.
        let result = aggregate(&rows, "within").unwrap();
        assert!((result - 35.0).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_across_uses_by_as_context() {
        let rows = vec![row("a", "b", "C", 0.0), row("a", "b", "D", 1.0)];
        let result = aggregate(&rows, "across").unwrap();
        assert!((result - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_differs_from_flat_mean() {
        // Context A has three rows, context B one; a flat mean would give
        // (0.0 * 3 + 1.0) / 4 = 0.25 instead of 0.5.
        let rows = vec![
            row("a", "b", "A", 0.0),
            row("a", "b", "A", 0.0),
            row("a", "b", "A", 0.0),
            row("a", "b", "B", 1.0),
        ];
        let result = aggregate(&rows, "across").unwrap();
        assert!((result - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_unknown_task_type() {
        let rows = vec![row("a", "b", "C", 0.5)];
        let err = aggregate(&rows, "unknown").unwrap_err();
        assert!(matches!(err, AggregateError::UnknownTaskType(_)));
    }

    #[test]
    fn test_aggregate_empty_table() {
        assert!(matches!(
            aggregate(&[], "within"),
            Err(AggregateError::EmptyTable)
        ));
    }

    #[test]
    fn test_aggregate_malformed_by_is_fatal() {
        let rows = vec![row("a", "b", "no tuple here", 0.5)];
        let err = aggregate(&rows, "within").unwrap_err();
        assert!(matches!(err, AggregateError::MalformedBy { .. }));
    }

    #[test]
    fn test_decode_talker_context() {
        assert_eq!(
            decode_talker_context("('s1', 'a_b')").unwrap(),
            ("s1".to_string(), "a_b".to_string())
        );
        assert_eq!(
            decode_talker_context("(\"s1\", \"ctx\")").unwrap(),
            ("s1".to_string(), "ctx".to_string())
        );
        assert!(decode_talker_context("('s1',)").is_err());
        assert!(decode_talker_context("('s1', 'a', 'b')").is_err());
    }

    #[test]
    fn test_parse_table() {
        let text = "phone_1\tphone_2\tby\tscore\na\tb\tC\t0.25\na\tb\tD\t0.75\n";
        let rows = parse_table(text).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], row("a", "b", "C", 0.25));
    }

    #[test]
    fn test_parse_table_missing_column() {
        let err = parse_table("phone_1\tphone_2\tscore\n").unwrap_err();
        assert!(err.to_string().contains("by"));
    }

    #[test]
    fn test_parse_table_bad_score() {
        let text = "phone_1\tphone_2\tby\tscore\na\tb\tC\tnot-a-number\n";
        assert!(matches!(
            parse_table(text),
            Err(AggregateError::MalformedRow { line: 2, .. })
        ));
    }
}
