//! Dataset Query Guard
//!
//! Validates and rewrites untrusted SQL text before it reaches the store.
//! A query is approved only if it is a read-only SELECT against the rows
//! table, filtered to dataset ids the caller is authorized for; approved
//! queries without an explicit LIMIT get a hard row cap appended.
//!
//! This is a textual heuristic over the query string, not a SQL parser,
//! and is best-effort: a sufficiently creative statement (nested quoting,
//! comment tricks, dialect-specific syntax) can slip past the pattern
//! checks. The row cap and the read-only store connection are the backstops;
//! this layer exists to catch the common failure modes of model-written SQL
//! and to give the model an actionable rejection message.

use std::sync::LazyLock;

use regex::Regex;
use tabletalk_core::DatasetScope;
use thiserror::Error;

/// Table every query must target.
pub const ROWS_TABLE: &str = "rows";

/// Column carrying the dataset id in the rows table.
pub const SCOPE_COLUMN: &str = "dataset_id";

/// Hard cap appended when a query carries no LIMIT of its own.
pub const ROW_CAP: u32 = 1000;

/// Why a query was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryRejection {
    #[error("only SELECT statements are allowed")]
    NotReadOnly,

    #[error("query contains forbidden keyword '{0}'")]
    MutatingKeyword(String),

    #[error("query must select from the '{ROWS_TABLE}' table")]
    MissingRowsTable,

    #[error("query must filter on {SCOPE_COLUMN} (e.g. WHERE {SCOPE_COLUMN} = '<id>')")]
    MissingScopeFilter,

    #[error("dataset '{id}' is not authorized; authorized datasets: {authorized}")]
    UnauthorizedDataset { id: String, authorized: String },
}

static SELECT_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^select\b").expect("static regex"));
static MUTATING_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(insert|update|delete|drop|truncate|alter|create|exec|execute|grant|revoke)\b")
        .expect("static regex")
});
static ROWS_TABLE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\brows\b").expect("static regex"));
static SCOPE_EQ: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bdataset_id\s*=\s*'([^']*)'").expect("static regex"));
static SCOPE_IN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bdataset_id\s+in\s*\(([^)]*)\)").expect("static regex"));
static QUOTED_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'([^']*)'").expect("static regex"));
static LIMIT_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\blimit\b").expect("static regex"));

/// Dataset ids referenced by scope-filter expressions in the query.
///
/// Matches both `dataset_id = '<id>'` and `dataset_id IN ('<a>', '<b>')`,
/// preserving the literal case of each id.
fn extract_dataset_ids(query: &str) -> Vec<String> {
    let mut ids = Vec::new();
    for cap in SCOPE_EQ.captures_iter(query) {
        ids.push(cap[1].to_string());
    }
    for cap in SCOPE_IN.captures_iter(query) {
        for id in QUOTED_ID.captures_iter(&cap[1]) {
            ids.push(id[1].to_string());
        }
    }
    ids
}

/// Validate `query` against `scope`.
///
/// Checks run in order and the first failure wins. The whole-word mutating
/// keyword scan runs before the SELECT-prefix check so a destructive
/// statement is always rejected for its keyword, regardless of how it
/// starts. On success, returns the statement to execute, with a
/// `LIMIT {ROW_CAP}` appended when the query carried none. Pure function of
/// its inputs; never panics on any input string.
pub fn validate(query: &str, scope: &DatasetScope) -> Result<String, QueryRejection> {
    let trimmed = query.trim();
    let lowered = trimmed.to_lowercase();

    if let Some(m) = MUTATING_KEYWORD.find(&lowered) {
        return Err(QueryRejection::MutatingKeyword(m.as_str().to_string()));
    }

    if !SELECT_PREFIX.is_match(&lowered) {
        return Err(QueryRejection::NotReadOnly);
    }

    if !ROWS_TABLE_REF.is_match(&lowered) {
        return Err(QueryRejection::MissingRowsTable);
    }

    let ids = extract_dataset_ids(trimmed);
    if ids.is_empty() {
        return Err(QueryRejection::MissingScopeFilter);
    }

    for id in &ids {
        if !scope.contains(id) {
            return Err(QueryRejection::UnauthorizedDataset {
                id: id.clone(),
                authorized: scope.to_string(),
            });
        }
    }

    if LIMIT_CLAUSE.is_match(&lowered) {
        Ok(trimmed.to_string())
    } else {
        let stmt = trimmed.trim_end_matches(';').trim_end();
        Ok(format!("{} LIMIT {}", stmt, ROW_CAP))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(ids: &[&str]) -> DatasetScope {
        DatasetScope::new(ids.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_accepts_scoped_select_and_appends_cap() {
        let result = validate(
            "SELECT * FROM rows WHERE dataset_id = 'A'",
            &scope(&["A", "B"]),
        )
        .unwrap();
        assert_eq!(result, "SELECT * FROM rows WHERE dataset_id = 'A' LIMIT 1000");
    }

    #[test]
    fn test_existing_limit_left_unmodified() {
        let query = "SELECT * FROM rows WHERE dataset_id = 'A' LIMIT 50";
        let result = validate(query, &scope(&["A"])).unwrap();
        assert_eq!(result, query);
    }

    #[test]
    fn test_trailing_semicolon_stripped_before_cap() {
        let result = validate(
            "SELECT * FROM rows WHERE dataset_id = 'A';",
            &scope(&["A"]),
        )
        .unwrap();
        assert_eq!(result, "SELECT * FROM rows WHERE dataset_id = 'A' LIMIT 1000");
    }

    #[test]
    fn test_rejects_non_select() {
        let err = validate("SHOW TABLES", &scope(&["A"])).unwrap_err();
        assert_eq!(err, QueryRejection::NotReadOnly);
    }

    #[test]
    fn test_destructive_statement_rejected_for_its_keyword() {
        // The keyword class wins over the missing SELECT prefix, whatever
        // the scope is.
        let err = validate("DROP TABLE rows", &scope(&["A", "B"])).unwrap_err();
        assert_eq!(err, QueryRejection::MutatingKeyword("drop".to_string()));

        let err = validate("DROP TABLE rows", &scope(&[])).unwrap_err();
        assert_eq!(err, QueryRejection::MutatingKeyword("drop".to_string()));
    }

    #[test]
    fn test_leading_keyword_is_case_insensitive() {
        for query in [
            "select * FROM rows WHERE dataset_id = 'A'",
            "SELECT * FROM rows WHERE dataset_id = 'A'",
            "SeLeCt * FROM rows WHERE dataset_id = 'A'",
        ] {
            assert!(validate(query, &scope(&["A"])).is_ok(), "rejected: {query}");
        }
    }

    #[test]
    fn test_same_input_yields_same_verdict() {
        let scope = scope(&["A"]);
        let accepted = "SELECT * FROM rows WHERE dataset_id = 'A'";
        assert_eq!(validate(accepted, &scope), validate(accepted, &scope));

        let rejected = "SELECT * FROM rows WHERE dataset_id = 'C'";
        assert_eq!(validate(rejected, &scope), validate(rejected, &scope));
    }

    #[test]
    fn test_rejects_embedded_mutating_keyword() {
        let err = validate(
            "SELECT * FROM rows WHERE dataset_id = 'A'; DELETE FROM rows",
            &scope(&["A"]),
        )
        .unwrap_err();
        assert_eq!(err, QueryRejection::MutatingKeyword("delete".to_string()));
    }

    #[test]
    fn test_keyword_inside_identifier_is_not_flagged() {
        // "created_at" contains "create" but not as a whole word
        let result = validate(
            "SELECT created_at FROM rows WHERE dataset_id = 'A'",
            &scope(&["A"]),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_rejects_missing_rows_table() {
        let err = validate(
            "SELECT * FROM users WHERE dataset_id = 'A'",
            &scope(&["A"]),
        )
        .unwrap_err();
        assert_eq!(err, QueryRejection::MissingRowsTable);
    }

    #[test]
    fn test_rejects_missing_scope_filter() {
        let err = validate("SELECT * FROM rows", &scope(&["A"])).unwrap_err();
        assert_eq!(err, QueryRejection::MissingScopeFilter);
    }

    #[test]
    fn test_rejects_unauthorized_dataset_with_names() {
        let err = validate(
            "SELECT * FROM rows WHERE dataset_id = 'C'",
            &scope(&["A", "B"]),
        )
        .unwrap_err();
        match err {
            QueryRejection::UnauthorizedDataset { id, authorized } => {
                assert_eq!(id, "C");
                assert!(authorized.contains('A'));
                assert!(authorized.contains('B'));
            }
            other => panic!("unexpected rejection: {other:?}"),
        }
    }

    #[test]
    fn test_in_clause_ids_all_checked() {
        let ok = validate(
            "SELECT * FROM rows WHERE dataset_id IN ('A', 'B')",
            &scope(&["A", "B"]),
        );
        assert!(ok.is_ok());

        let err = validate(
            "SELECT * FROM rows WHERE dataset_id IN ('A', 'C')",
            &scope(&["A", "B"]),
        )
        .unwrap_err();
        assert!(matches!(err, QueryRejection::UnauthorizedDataset { id, .. } if id == "C"));
    }

    #[test]
    fn test_id_case_is_preserved() {
        let err = validate(
            "SELECT * FROM rows WHERE DATASET_ID = 'MixedCase'",
            &scope(&["other"]),
        )
        .unwrap_err();
        assert!(matches!(err, QueryRejection::UnauthorizedDataset { id, .. } if id == "MixedCase"));
    }

    #[test]
    fn test_rejection_messages_are_actionable() {
        let err = validate(
            "SELECT * FROM rows WHERE dataset_id = 'C'",
            &scope(&["A"]),
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'C'"));
        assert!(message.contains('A'));
    }
}
