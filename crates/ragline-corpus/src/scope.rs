//! Attribute filters for vector search and per-caller access scopes.

use std::collections::HashSet;

/// Set of chunk ids a keyword search may return.
pub type IdScope = HashSet<String>;

pub const PROJECT_FIELD: &str = "project";
pub const DEPARTMENT_FIELD: &str = "department";
pub const NETWORK_FIELD: &str = "network";
pub const ACCESS_FIELD: &str = "access";
/// Access value that every caller may read.
pub const GENERAL_ACCESS: &str = "general";

/// Payload filter: every `must` holds, no `must_not` holds, and at least one
/// `should` holds when `should` is non-empty.
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub must: Vec<FieldCondition>,
    pub must_not: Vec<FieldCondition>,
    pub should: Vec<FieldCondition>,
}

#[derive(Debug, Clone)]
pub struct FieldCondition {
    pub field: String,
    pub value: FieldValue,
}

impl FieldCondition {
    #[must_use]
    pub fn new(field: impl Into<String>, value: FieldValue) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }
}

#[derive(Debug, Clone)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
    AnyOf(Vec<String>),
}

impl VectorFilter {
    /// Check a stored payload against this filter.
    #[must_use]
    pub fn matches(&self, payload: &crate::types::Metadata) -> bool {
        let holds = |cond: &FieldCondition| {
            payload
                .get(&cond.field)
                .is_some_and(|val| field_matches(val, &cond.value))
        };
        self.must.iter().all(holds)
            && !self.must_not.iter().any(holds)
            && (self.should.is_empty() || self.should.iter().any(holds))
    }
}

fn field_matches(val: &serde_json::Value, expected: &FieldValue) -> bool {
    match (val, expected) {
        (serde_json::Value::Array(items), _) => items.iter().any(|v| field_matches(v, expected)),
        (_, FieldValue::Integer(i)) => val.as_i64() == Some(*i),
        (_, FieldValue::Text(s)) => val.as_str() == Some(s.as_str()),
        (_, FieldValue::AnyOf(options)) => val
            .as_str()
            .is_some_and(|s| options.iter().any(|o| o == s)),
    }
}

/// What one caller is allowed to see.
///
/// Keyword search is restricted to `allowed_ids`; vector search matches chunks
/// tagged with one of the caller's projects, departments or networks, or marked
/// as general access.
#[derive(Debug, Clone, Default)]
pub struct AccessScope {
    pub allowed_ids: HashSet<String>,
    pub projects: Vec<String>,
    pub departments: Vec<String>,
    pub networks: Vec<String>,
}

impl AccessScope {
    #[must_use]
    pub fn id_scope(&self) -> IdScope {
        self.allowed_ids.clone()
    }

    #[must_use]
    pub fn vector_filter(&self) -> VectorFilter {
        let mut should = Vec::with_capacity(4);
        for (field, values) in [
            (PROJECT_FIELD, &self.projects),
            (DEPARTMENT_FIELD, &self.departments),
            (NETWORK_FIELD, &self.networks),
        ] {
            if !values.is_empty() {
                should.push(FieldCondition::new(field, FieldValue::AnyOf(values.clone())));
            }
        }
        should.push(FieldCondition::new(
            ACCESS_FIELD,
            FieldValue::Text(GENERAL_ACCESS.into()),
        ));
        VectorFilter {
            should,
            ..VectorFilter::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::Metadata;

    fn payload(pairs: &[(&str, serde_json::Value)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(VectorFilter::default().matches(&Metadata::new()));
    }

    #[test]
    fn must_and_must_not() {
        let filter = VectorFilter {
            must: vec![FieldCondition::new("lang", FieldValue::Text("vi".into()))],
            must_not: vec![FieldCondition::new("year", FieldValue::Integer(2019))],
            should: vec![],
        };
        assert!(filter.matches(&payload(&[("lang", json!("vi")), ("year", json!(2024))])));
        assert!(!filter.matches(&payload(&[("lang", json!("vi")), ("year", json!(2019))])));
        assert!(!filter.matches(&payload(&[("lang", json!("en"))])));
    }

    #[test]
    fn any_of_matches_array_payload() {
        let filter = VectorFilter {
            should: vec![FieldCondition::new(
                PROJECT_FIELD,
                FieldValue::AnyOf(vec!["apollo".into()]),
            )],
            ..VectorFilter::default()
        };
        assert!(filter.matches(&payload(&[(PROJECT_FIELD, json!(["hermes", "apollo"]))])));
        assert!(!filter.matches(&payload(&[(PROJECT_FIELD, json!(["hermes"]))])));
    }

    #[test]
    fn scope_filter_admits_general_documents() {
        let scope = AccessScope {
            projects: vec!["apollo".into()],
            ..AccessScope::default()
        };
        let filter = scope.vector_filter();
        assert!(filter.matches(&payload(&[(ACCESS_FIELD, json!(GENERAL_ACCESS))])));
        assert!(filter.matches(&payload(&[(PROJECT_FIELD, json!("apollo"))])));
        assert!(!filter.matches(&payload(&[(PROJECT_FIELD, json!("zeus"))])));
        assert!(!filter.matches(&Metadata::new()));
    }

    #[test]
    fn empty_scope_only_sees_general() {
        let filter = AccessScope::default().vector_filter();
        assert_eq!(filter.should.len(), 1);
        assert!(!filter.matches(&payload(&[(DEPARTMENT_FIELD, json!("hr"))])));
    }
}
