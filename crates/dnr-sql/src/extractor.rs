//! Relation extraction from SQL AST

use sqlparser::ast::{visit_relations, ObjectName, ObjectNamePart, Query, Statement, Visit, Visitor};
use std::collections::BTreeSet;
use std::ops::ControlFlow;

/// Render an object name without quoting (`serving.person_360`)
pub fn object_name_to_string(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|part| match part {
            ObjectNamePart::Identifier(ident) => ident.value.clone(),
            #[allow(unreachable_patterns)]
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Extract all relation references from SQL statements.
///
/// Uses `visit_relations` to walk the AST and collect every `ObjectName`
/// referenced from FROM clauses, JOINs and subqueries. CTE references are
/// included; filter them with [`extract_cte_names`].
pub fn extract_dependencies(statements: &[Statement]) -> BTreeSet<String> {
    let mut deps = BTreeSet::new();

    for stmt in statements {
        let _ = visit_relations(stmt, |relation| {
            deps.insert(object_name_to_string(relation));
            ControlFlow::<()>::Continue(())
        });
    }

    deps
}

struct CteCollector {
    names: BTreeSet<String>,
}

impl Visitor for CteCollector {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.names.insert(cte.alias.name.value.clone());
            }
        }
        ControlFlow::Continue(())
    }
}

/// Names bound by WITH clauses anywhere in the statements
pub fn extract_cte_names(statements: &[Statement]) -> BTreeSet<String> {
    let mut collector = CteCollector {
        names: BTreeSet::new(),
    };
    for stmt in statements {
        let _ = stmt.visit(&mut collector);
    }
    collector.names
}

#[cfg(test)]
#[path = "extractor_test.rs"]
mod tests;
