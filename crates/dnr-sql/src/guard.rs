//! Read-only query guard for the external query boundary
//!
//! Ad-hoc SQL passes a lexical screen (no comments, no stacked statements,
//! no write keywords outside literals), then a parse that must yield one
//! query whose relations all live in the allowed schemas. The admitted SQL
//! always carries a row limit no larger than the policy maximum.

use crate::error::{SqlError, SqlResult};
use crate::extractor::{extract_cte_names, extract_dependencies};
use crate::parser::SqlParser;
use sqlparser::ast::{Expr, LimitClause, Statement, Value};

/// Keywords that never appear in a read-only query
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "MERGE", "UPSERT", "DROP", "CREATE", "ALTER", "TRUNCATE",
    "GRANT", "REVOKE", "COPY", "ATTACH", "DETACH", "INSTALL", "LOAD", "PRAGMA", "SET",
    "RESET", "CALL", "EXPORT", "IMPORT", "VACUUM", "CHECKPOINT", "EXECUTE", "PREPARE",
    "BEGIN", "COMMIT", "ROLLBACK", "USE",
];

/// Function name prefixes that reach the filesystem or environment
const FORBIDDEN_FUNCTION_PREFIXES: &[&str] = &[
    "read_", "glob", "getenv", "sniff_csv", "parquet_", "query_table", "httpfs",
];

/// Limits applied to every admitted query
#[derive(Debug, Clone)]
pub struct GuardPolicy {
    pub allowed_schemas: Vec<String>,
    pub max_rows: usize,
}

/// SQL that passed the guard, ready to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardedQuery {
    pub sql: String,
    pub max_rows: usize,
    /// Relations the query reads, CTE names excluded
    pub relations: Vec<String>,
}

/// Validates ad-hoc SQL against a [`GuardPolicy`]
pub struct QueryGuard {
    policy: GuardPolicy,
    parser: SqlParser,
}

impl QueryGuard {
    pub fn new(policy: GuardPolicy) -> Self {
        Self {
            policy,
            parser: SqlParser::duckdb(),
        }
    }

    pub fn policy(&self) -> &GuardPolicy {
        &self.policy
    }

    /// Admit `sql` or explain why it was rejected
    pub fn check(&self, sql: &str) -> SqlResult<GuardedQuery> {
        let trimmed = sql.trim();
        let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
        if trimmed.is_empty() {
            return Err(SqlError::EmptySql);
        }

        let words = scan_words(trimmed)?;
        match words.first().map(|w| w.to_ascii_uppercase()) {
            Some(first) if first == "SELECT" || first == "WITH" => {}
            Some(first) => {
                return Err(SqlError::UnsupportedStatement(format!(
                    "only SELECT or WITH queries are allowed, found {first}"
                )))
            }
            None => return Err(SqlError::EmptySql),
        }
        for (idx, word) in words.iter().enumerate() {
            let upper = word.to_ascii_uppercase();
            if FORBIDDEN_KEYWORDS.contains(&upper.as_str()) {
                return Err(SqlError::ForbiddenKeyword { keyword: upper });
            }
            let lower = word.to_ascii_lowercase();
            let is_call = words.get(idx + 1).is_some_and(|next| next == "(");
            if is_call
                && FORBIDDEN_FUNCTION_PREFIXES
                    .iter()
                    .any(|prefix| lower.starts_with(prefix))
            {
                return Err(SqlError::ForbiddenFunction { name: lower });
            }
        }

        let statement = self.parser.parse_single(trimmed)?;
        let Statement::Query(query) = &statement else {
            return Err(SqlError::UnsupportedStatement(
                "only queries are allowed".to_string(),
            ));
        };

        let statements = std::slice::from_ref(&statement);
        let ctes = extract_cte_names(statements);
        let mut relations = Vec::new();
        for relation in extract_dependencies(statements) {
            if ctes.contains(&relation) {
                continue;
            }
            if !self.relation_allowed(&relation) {
                return Err(SqlError::SchemaNotAllowed {
                    relation,
                    allowed: self.policy.allowed_schemas.join(", "),
                });
            }
            relations.push(relation);
        }

        let max_rows = self.policy.max_rows;
        let sql = match top_level_limit(query.limit_clause.as_ref()) {
            Some(limit) if limit <= max_rows as u64 => trimmed.to_string(),
            _ => format!("SELECT * FROM ({trimmed}) AS guarded_query LIMIT {max_rows}"),
        };

        Ok(GuardedQuery {
            sql,
            max_rows,
            relations,
        })
    }

    fn relation_allowed(&self, relation: &str) -> bool {
        let parts: Vec<&str> = relation.split('.').collect();
        match parts.as_slice() {
            [schema, _] => self
                .policy
                .allowed_schemas
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(schema)),
            _ => false,
        }
    }
}

/// Numeric LIMIT on the outermost query, if any
fn top_level_limit(clause: Option<&LimitClause>) -> Option<u64> {
    let limit = match clause? {
        LimitClause::LimitOffset { limit, .. } => limit.as_ref()?,
        LimitClause::OffsetCommaLimit { limit, .. } => limit,
    };
    match limit {
        Expr::Value(value) => match &value.value {
            Value::Number(n, _) => n.parse().ok(),
            _ => None,
        },
        _ => None,
    }
}

/// Split SQL into bare words (and `(` markers) outside string literals and
/// quoted identifiers, rejecting comments and statement separators.
fn scan_words(sql: &str) -> SqlResult<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut chars = sql.chars().peekable();

    let flush = |current: &mut String, words: &mut Vec<String>| {
        if !current.is_empty() {
            words.push(std::mem::take(current));
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                flush(&mut current, &mut words);
                // A doubled quote inside the literal is an escaped quote
                loop {
                    match chars.next() {
                        Some(q) if q == c => {
                            if chars.peek() == Some(&c) {
                                chars.next();
                            } else {
                                break;
                            }
                        }
                        Some(_) => {}
                        None => break,
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => return Err(SqlError::CommentNotAllowed),
            '/' if chars.peek() == Some(&'*') => return Err(SqlError::CommentNotAllowed),
            ';' => return Err(SqlError::MultipleStatements),
            '(' => {
                flush(&mut current, &mut words);
                words.push("(".to_string());
            }
            c if c.is_alphanumeric() || c == '_' => current.push(c),
            _ => flush(&mut current, &mut words),
        }
    }
    flush(&mut current, &mut words);
    Ok(words)
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
