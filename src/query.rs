//! Dynamic filter predicates and pagination for translation queries.
//!
//! Filters are optional, case-insensitive, exact-match, and compose with AND.
//! The builder produces a SQL suffix plus bind values in matching order so the
//! store can splice them into its search statements.

use crate::error::{ServiceError, ServiceResult};

/// Optional search constraints over key, tag name, and content.
#[derive(Debug, Default, Clone)]
pub struct SearchFilters {
    pub key: Option<String>,
    pub tag: Option<String>,
    pub content: Option<String>,
}

impl SearchFilters {
    /// Empty strings count as absent, matching the HTTP query-param contract.
    pub fn new(key: Option<String>, tag: Option<String>, content: Option<String>) -> Self {
        Self {
            key: key.filter(|s| !s.is_empty()),
            tag: tag.filter(|s| !s.is_empty()),
            content: content.filter(|s| !s.is_empty()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_none() && self.tag.is_none() && self.content.is_none()
    }

    /// Builds the WHERE clause (or an empty string when unconstrained) and the
    /// bind values for it. Table aliases: `t` translations, `g` tags.
    pub fn predicates(&self) -> (String, Vec<String>) {
        let mut clauses: Vec<&str> = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        if let Some(key) = &self.key {
            clauses.push("lower(t.key) = ?");
            binds.push(key.to_lowercase());
        }
        if let Some(tag) = &self.tag {
            clauses.push("lower(g.name) = ?");
            binds.push(tag.to_lowercase());
        }
        if let Some(content) = &self.content {
            clauses.push("lower(t.content) = ?");
            binds.push(content.to_lowercase());
        }

        if clauses.is_empty() {
            (String::new(), binds)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), binds)
        }
    }
}

/// Zero-based page request. Sizes must be positive; a non-positive size is an
/// error to surface, never a silent clamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub size: i64,
}

impl PageRequest {
    pub fn new(page: i64, size: i64) -> ServiceResult<Self> {
        if page < 0 {
            return Err(ServiceError::Validation(format!(
                "Page number cannot be negative: {page}"
            )));
        }
        if size <= 0 {
            return Err(ServiceError::Validation(format!(
                "Page size must be positive: {size}"
            )));
        }
        Ok(Self { page, size })
    }

    pub fn offset(&self) -> i64 {
        self.page * self.size
    }
}

/// One page of results together with the total row count for the query.
#[derive(Debug, Clone)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub size: i64,
    pub total_items: i64,
}

impl<T> PageResult<T> {
    pub fn total_pages(&self) -> i64 {
        if self.size > 0 {
            (self.total_items + self.size - 1) / self.size
        } else if self.total_items > 0 {
            1
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
