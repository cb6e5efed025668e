//! Conjunctive user filters.
//!
//! A [`UserFilter`] is a list of independent clauses ANDed together. The same
//! filter is rendered to SQL for Postgres and evaluated directly by the
//! in-memory store, so both backends agree on what matches.

use sqlx::{Postgres, QueryBuilder};
use time::{format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime};

use crate::users::{
    dto::FindUsersQuery,
    error::{UserError, UserResult},
    repo_types::User,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Status(bool),
    /// Literal substring of `name`.
    NameContains(String),
    LastLoginBefore(OffsetDateTime),
    LastLoginAfter(OffsetDateTime),
}

impl Clause {
    fn matches(&self, user: &User) -> bool {
        match self {
            Clause::Status(active) => user.status == *active,
            Clause::NameContains(needle) => user.name.contains(needle.as_str()),
            Clause::LastLoginBefore(t) => user.last_login.is_some_and(|l| l < *t),
            Clause::LastLoginAfter(t) => user.last_login.is_some_and(|l| l > *t),
        }
    }

    fn push_sql<'a>(&self, qb: &mut QueryBuilder<'a, Postgres>) {
        match self {
            Clause::Status(active) => {
                qb.push("status = ").push_bind(*active);
            }
            Clause::NameContains(needle) => {
                qb.push("name LIKE ").push_bind(like_pattern(needle));
            }
            Clause::LastLoginBefore(t) => {
                qb.push("last_login < ").push_bind(*t);
            }
            Clause::LastLoginAfter(t) => {
                qb.push("last_login > ").push_bind(*t);
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserFilter {
    clauses: Vec<Clause>,
}

impl UserFilter {
    /// No clauses: matches every record, active or not.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn active() -> Self {
        Self::default().with(Clause::Status(true))
    }

    pub fn with(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Builds the filter for `findUsers`. `deleted=true` selects soft-deleted
    /// records, any other value selects active ones; no key means no status
    /// clause. Both last-login bounds apply when given.
    pub fn from_query(query: FindUsersQuery) -> UserResult<Self> {
        let mut filter = Self::all();

        if let Some(deleted) = query.deleted {
            filter = filter.with(Clause::Status(deleted != "true"));
        }
        if let Some(name) = non_empty(query.name) {
            filter = filter.with(Clause::NameContains(name));
        }
        if let Some(raw) = non_empty(query.last_login_before) {
            filter = filter.with(Clause::LastLoginBefore(parse_instant("lastLoginBefore", &raw)?));
        }
        if let Some(raw) = non_empty(query.last_login_after) {
            filter = filter.with(Clause::LastLoginAfter(parse_instant("lastLoginAfter", &raw)?));
        }

        Ok(filter)
    }

    pub fn matches(&self, user: &User) -> bool {
        self.clauses.iter().all(|c| c.matches(user))
    }

    /// Appends ` WHERE a AND b ...` to `qb`; appends nothing for an empty filter.
    pub fn push_where<'a>(&self, qb: &mut QueryBuilder<'a, Postgres>) {
        for (i, clause) in self.clauses.iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            clause.push_sql(qb);
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates (midnight UTC).
pub(crate) fn parse_instant(field: &str, raw: &str) -> UserResult<OffsetDateTime> {
    if let Ok(t) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(t);
    }
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map(|d| d.midnight().assume_utc())
        .map_err(|_| UserError::Validation(format!("Invalid date for {field}: {raw}")))
}
