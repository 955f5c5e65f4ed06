//! Filtered, sorted, paginated issue listing.
//!
//! Every value-level predicate is a bound parameter. Identifiers that end up
//! in the SQL text (sort column and direction) come only from the closed
//! [`SortField`] / [`SortDirection`] enums, never from request text.

use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params_from_iter, Connection, ToSql};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::to_count;
use crate::db::{map_issue, CASE_FOLD_FN};
use crate::error::Result;
use crate::models::Issue;
use crate::schema::issues;
use crate::validation::InputValidator;

/// Raw listing parameters as they arrive on the query string
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub search: Option<String>,
    pub status: Option<String>,
    pub source: Option<String>,
    pub issue_type: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub sort_by: Option<String>,
    pub sort_direction: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// Columns a listing may be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    Id,
    Title,
    Status,
    Source,
    IssueType,
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    const fn column(self) -> &'static str {
        match self {
            Self::Id => issues::ID,
            Self::Title => issues::TITLE,
            Self::Status => issues::STATUS,
            Self::Source => issues::SOURCE,
            Self::IssueType => issues::ISSUE_TYPE,
            Self::CreatedAt => issues::CREATED_AT,
            Self::UpdatedAt => issues::UPDATED_AT,
        }
    }

    /// Allow-list lookup; anything unrecognized falls back to `created_at`
    #[must_use]
    pub fn parse_lenient(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for SortField {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "id" => Ok(Self::Id),
            "title" => Ok(Self::Title),
            "status" => Ok(Self::Status),
            "source" => Ok(Self::Source),
            "issue_type" => Ok(Self::IssueType),
            "created_at" => Ok(Self::CreatedAt),
            "updated_at" => Ok(Self::UpdatedAt),
            _ => Err(()),
        }
    }
}

/// Sort direction; only an explicit `asc` sorts ascending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    #[must_use]
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("asc") => Self::Asc,
            _ => Self::Desc,
        }
    }

    const fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Pagination metadata returned alongside a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub total: u64,
    pub current_page: u32,
    pub per_page: u32,
    pub total_pages: u64,
}

impl Pagination {
    fn new(total: u64, current_page: u32, per_page: u32) -> Self {
        Self {
            total,
            current_page,
            per_page,
            total_pages: total.div_ceil(u64::from(per_page.max(1))),
        }
    }
}

/// One page of a listing
#[derive(Debug, Clone, Serialize)]
pub struct IssuePage {
    pub issues: Vec<Issue>,
    pub pagination: Pagination,
}

/// Typed listing request built from untrusted parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub source: Option<String>,
    pub issue_type: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub sort_by: SortField,
    pub sort_direction: SortDirection,
    pub page: u32,
    pub limit: u32,
}

impl Default for IssueQuery {
    fn default() -> Self {
        Self {
            search: None,
            status: None,
            source: None,
            issue_type: None,
            date_from: None,
            date_to: None,
            sort_by: SortField::default(),
            sort_direction: SortDirection::default(),
            page: 1,
            limit: 10,
        }
    }
}

impl IssueQuery {
    /// Normalize raw parameters.
    ///
    /// Malformed or reversed dates are validation errors. Malformed `page` / `limit`
    /// fall back to 1 / `default_limit`, and `limit` is capped at `max_limit`.
    pub fn from_params(params: &ListParams, default_limit: u32, max_limit: u32) -> Result<Self> {
        let date_from = non_blank(params.date_from.as_deref())
            .map(|v| InputValidator::validate_date_param("date_from", v))
            .transpose()?;
        let date_to = non_blank(params.date_to.as_deref())
            .map(|v| InputValidator::validate_date_param("date_to", v))
            .transpose()?;
        InputValidator::validate_date_range(date_from, date_to)?;

        let page = positive(params.page.as_deref()).unwrap_or(1);
        let limit = positive(params.limit.as_deref())
            .unwrap_or(default_limit)
            .clamp(1, max_limit.max(1));

        Ok(Self {
            search: non_blank(params.search.as_deref()).map(str::to_string),
            status: non_blank(params.status.as_deref()).map(str::to_string),
            source: non_blank(params.source.as_deref()).map(str::to_string),
            issue_type: non_blank(params.issue_type.as_deref()).map(str::to_string),
            date_from,
            date_to,
            sort_by: SortField::parse_lenient(params.sort_by.as_deref()),
            sort_direction: SortDirection::parse_lenient(params.sort_direction.as_deref()),
            page,
            limit,
        })
    }

    /// Rows skipped before this page
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    /// WHERE clause and its bound values, shared by the page and count queries
    fn build_where(&self) -> (String, Vec<Box<dyn ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(search) = &self.search {
            let pattern = format!("%{}%", escape_like(search));
            conditions.push(format!(
                "({f}({}) LIKE {f}(?) ESCAPE '\\' OR {f}({}) LIKE {f}(?) ESCAPE '\\')",
                issues::TITLE,
                issues::DESCRIPTION,
                f = CASE_FOLD_FN
            ));
            params.push(Box::new(pattern.clone()));
            params.push(Box::new(pattern));
        }
        if let Some(status) = &self.status {
            conditions.push(format!("{} = ?", issues::STATUS));
            params.push(Box::new(status.clone()));
        }
        if let Some(source) = &self.source {
            conditions.push(format!("{} = ?", issues::SOURCE));
            params.push(Box::new(source.clone()));
        }
        if let Some(issue_type) = &self.issue_type {
            conditions.push(format!("{} = ?", issues::ISSUE_TYPE));
            params.push(Box::new(issue_type.clone()));
        }
        if let Some(from) = self.date_from {
            conditions.push(format!("date({}) >= ?", issues::CREATED_AT));
            params.push(Box::new(from));
        }
        if let Some(to) = self.date_to {
            conditions.push(format!("date({}) <= ?", issues::CREATED_AT));
            params.push(Box::new(to));
        }

        let clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        (clause, params)
    }

    fn order_clause(&self) -> String {
        let mut clause = format!(
            " ORDER BY {} {}",
            self.sort_by.column(),
            self.sort_direction.keyword()
        );
        if self.sort_by != SortField::Id {
            clause.push_str(&format!(", {} ASC", issues::ID));
        }
        clause
    }

    /// Total rows matching the filters, ignoring pagination
    pub fn count(&self, conn: &Connection) -> Result<u64> {
        let (where_clause, params) = self.build_where();
        let sql = format!("SELECT COUNT(*) FROM {}{where_clause}", issues::TABLE);
        let total: i64 = conn.query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))?;
        Ok(to_count(total))
    }

    /// Run the page query and the matching count query
    pub fn execute(&self, conn: &Connection) -> Result<IssuePage> {
        let (where_clause, mut params) = self.build_where();
        let sql = format!(
            "SELECT * FROM {}{where_clause}{} LIMIT ? OFFSET ?",
            issues::TABLE,
            self.order_clause()
        );
        params.push(Box::new(i64::from(self.limit)));
        params.push(Box::new(i64::try_from(self.offset()).unwrap_or(i64::MAX)));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), map_issue)?;

        let mut results = Vec::new();
        for issue in rows {
            results.push(issue?);
        }

        let total = self.count(conn)?;
        debug!(
            total,
            page = self.page,
            limit = self.limit,
            returned = results.len(),
            "Listed issues"
        );

        Ok(IssuePage {
            issues: results,
            pagination: Pagination::new(total, self.page, self.limit),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn positive(value: Option<&str>) -> Option<u32> {
    value
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|v| *v > 0)
}

/// Escape LIKE wildcards so the term matches literally
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> ListParams {
        let mut p = ListParams::default();
        for (key, value) in pairs {
            let value = Some((*value).to_string());
            match *key {
                "search" => p.search = value,
                "status" => p.status = value,
                "date_from" => p.date_from = value,
                "date_to" => p.date_to = value,
                "sort_by" => p.sort_by = value,
                "sort_direction" => p.sort_direction = value,
                "page" => p.page = value,
                "limit" => p.limit = value,
                other => panic!("unexpected key {other}"),
            }
        }
        p
    }

    #[test]
    fn test_unknown_sort_field_falls_back() {
        let q = IssueQuery::from_params(&params(&[("sort_by", "title;DROP TABLE issues")]), 10, 100)
            .unwrap();
        assert_eq!(q.sort_by, SortField::CreatedAt);
        assert_eq!(q.order_clause(), " ORDER BY created_at DESC, id ASC");
    }

    #[test]
    fn test_sort_direction_normalization() {
        assert_eq!(SortDirection::parse_lenient(Some("ASC")), SortDirection::Asc);
        assert_eq!(SortDirection::parse_lenient(Some("up")), SortDirection::Desc);
        assert_eq!(SortDirection::parse_lenient(None), SortDirection::Desc);

        let q = IssueQuery {
            sort_by: SortField::Id,
            sort_direction: SortDirection::Asc,
            ..IssueQuery::default()
        };
        assert_eq!(q.order_clause(), " ORDER BY id ASC");
    }

    #[test]
    fn test_page_and_limit_coercion() {
        let q = IssueQuery::from_params(&params(&[("page", "abc"), ("limit", "-5")]), 10, 100).unwrap();
        assert_eq!((q.page, q.limit), (1, 10));

        let q = IssueQuery::from_params(&params(&[("page", "3"), ("limit", "5000")]), 10, 100).unwrap();
        assert_eq!((q.page, q.limit), (3, 100));
        assert_eq!(q.offset(), 200);
    }

    #[test]
    fn test_malformed_date_is_rejected() {
        assert!(IssueQuery::from_params(&params(&[("date_from", "03/01/2025")]), 10, 100).is_err());
    }

    #[test]
    fn test_where_clause_binds_every_value() {
        let q = IssueQuery::from_params(
            &params(&[("search", "50%_off"), ("status", "Closed"), ("date_to", "2025-03-31")]),
            10,
            100,
        )
        .unwrap();
        let (clause, bound) = q.build_where();
        assert!(!clause.contains("Closed"));
        assert!(!clause.contains("50"));
        assert_eq!(bound.len(), 4);
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn test_total_pages_rounds_up() {
        assert_eq!(Pagination::new(0, 1, 10).total_pages, 0);
        assert_eq!(Pagination::new(21, 1, 10).total_pages, 3);
        assert_eq!(Pagination::new(20, 1, 10).total_pages, 2);
    }
}
