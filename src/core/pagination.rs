//! Search parameters: pagination arithmetic and the interpreter chain that
//! turns raw request parameters into a [`RecordQuery`].
//!
//! Out-of-range pagination is rejected, never clamped: `page < 1`, `size < 1`
//! or `page * size` beyond `default_max_results` fail with `InvalidQuerystring`.

use crate::core::access::AccessRole;
use crate::core::agent::{Agent, AgentId, AgentRegistry};
use crate::core::error::WardenError;
use crate::core::identity::Identity;
use crate::core::store::RecordFilter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_RESULTS_PER_PAGE: i64 = 25;
pub const DEFAULT_MAX_RESULTS: i64 = 10000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationOptions {
    #[serde(default = "default_results_per_page")]
    pub default_results_per_page: i64,
    #[serde(default = "default_max_results")]
    pub default_max_results: i64,
}

fn default_results_per_page() -> i64 {
    DEFAULT_RESULTS_PER_PAGE
}

fn default_max_results() -> i64 {
    DEFAULT_MAX_RESULTS
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            default_results_per_page: DEFAULT_RESULTS_PER_PAGE,
            default_max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

/// A requested page window. Construct freely, check with [`Pagination::valid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub size: i64,
    pub max_results: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(1, DEFAULT_RESULTS_PER_PAGE, DEFAULT_MAX_RESULTS)
    }
}

impl Pagination {
    pub fn new(page: i64, size: i64, max_results: i64) -> Self {
        Self {
            page,
            size,
            max_results,
        }
    }

    /// Index of the first item of the page (0-based).
    pub fn from_idx(&self) -> i64 {
        (self.page - 1).saturating_mul(self.size)
    }

    /// One past the last item the page may hold.
    pub fn to_idx(&self) -> i64 {
        self.page.saturating_mul(self.size)
    }

    pub fn valid(&self) -> bool {
        self.page >= 1 && self.size >= 1 && self.to_idx() <= self.max_results
    }

    pub fn offset(&self) -> i64 {
        self.from_idx().max(0)
    }

    pub fn limit(&self) -> i64 {
        self.size.max(0)
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    /// More matches exist beyond this page and within the result cap.
    pub fn has_next(&self, total: u64) -> bool {
        let reachable = i64::try_from(total).unwrap_or(i64::MAX).min(self.max_results);
        self.to_idx() < reachable
            && self.page.saturating_add(1).saturating_mul(self.size) <= self.max_results
    }

    pub fn prev_page(&self) -> Option<i64> {
        self.has_prev().then(|| self.page - 1)
    }

    pub fn next_page(&self, total: u64) -> Option<i64> {
        self.has_next(total).then(|| self.page + 1)
    }
}

/// Raw search parameters as received from a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    pub page: Option<i64>,
    pub size: Option<i64>,
    #[serde(default)]
    pub include_deleted: bool,
    pub service: Option<String>,
    pub finished: Option<bool>,
    /// Creating user id, matched against the record's `user_id` column.
    pub user: Option<String>,
    /// `type:id` descriptor, e.g. `user:5`.
    pub agent: Option<String>,
    /// `owner` or `contributor`; narrows the agent filter.
    pub role: Option<String>,
}

/// What the interpreters produce: the store filter plus the page window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordQuery {
    pub filter: RecordFilter,
    pub pagination: Pagination,
}

/// One step of search-parameter interpretation.
///
/// Interpreters run in order against the same query; the first error aborts
/// the search before the store is touched.
pub trait ParamInterpreter {
    fn apply(
        &self,
        identity: &Identity,
        query: &mut RecordQuery,
        params: &mut SearchParams,
    ) -> Result<(), WardenError>;
}

/// Fills in `page`/`size` defaults and rejects invalid windows.
#[derive(Debug, Clone, Default)]
pub struct PaginationParam {
    options: PaginationOptions,
}

impl PaginationParam {
    pub fn new(options: PaginationOptions) -> Self {
        Self { options }
    }
}

impl ParamInterpreter for PaginationParam {
    fn apply(
        &self,
        _identity: &Identity,
        query: &mut RecordQuery,
        params: &mut SearchParams,
    ) -> Result<(), WardenError> {
        let size = *params
            .size
            .get_or_insert(self.options.default_results_per_page);
        let page = *params.page.get_or_insert(1);

        let pagination = Pagination::new(page, size, self.options.default_max_results);
        if !pagination.valid() {
            return Err(WardenError::InvalidQuerystring(format!(
                "Invalid pagination parameters: page={} size={} (max results {})",
                page, size, self.options.default_max_results
            )));
        }
        query.pagination = pagination;
        Ok(())
    }
}

/// Translates filter parameters into a [`RecordFilter`].
///
/// A `role` without an `agent` applies to the calling user.
#[derive(Debug, Clone)]
pub struct FilterParam {
    registry: Arc<AgentRegistry>,
}

impl FilterParam {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }
}

impl ParamInterpreter for FilterParam {
    fn apply(
        &self,
        identity: &Identity,
        query: &mut RecordQuery,
        params: &mut SearchParams,
    ) -> Result<(), WardenError> {
        let filter = &mut query.filter;
        filter.include_deleted = params.include_deleted;
        filter.service = params.service.clone();
        filter.finished = params.finished;
        filter.user_id = params.user.as_deref().map(AgentId::parse);

        filter.role = match params.role.as_deref() {
            Some(raw) => Some(
                raw.parse::<AccessRole>()
                    .map_err(|e| WardenError::InvalidQuerystring(e.to_string()))?,
            ),
            None => None,
        };

        filter.agent = match (params.agent.as_deref(), filter.role) {
            (Some(descriptor), _) => Some(
                self.registry
                    .parse_descriptor(descriptor)
                    .map_err(|e| WardenError::InvalidQuerystring(e.to_string()))?,
            ),
            (None, Some(role)) => Some(
                Agent::from_principal(&self.registry, identity).map_err(|_| {
                    WardenError::InvalidQuerystring(format!(
                        "role filter '{}' needs an agent or an authenticated caller",
                        role
                    ))
                })?,
            ),
            (None, None) => None,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interpret(params: &mut SearchParams) -> Result<RecordQuery, WardenError> {
        let mut query = RecordQuery::default();
        PaginationParam::default().apply(&Identity::user(1), &mut query, params)?;
        Ok(query)
    }

    #[test]
    fn defaults_are_written_back_into_params() {
        let mut params = SearchParams::default();
        let query = interpret(&mut params).unwrap();
        assert_eq!(params.page, Some(1));
        assert_eq!(params.size, Some(DEFAULT_RESULTS_PER_PAGE));
        assert_eq!(query.pagination.offset(), 0);
        assert_eq!(query.pagination.limit(), 25);
    }

    #[test]
    fn zero_and_oversized_windows_are_rejected() {
        for (page, size) in [(0, 10), (1, 0), (-1, 5), (1, 10_001), (101, 100)] {
            let mut params = SearchParams {
                page: Some(page),
                size: Some(size),
                ..SearchParams::default()
            };
            assert!(
                matches!(interpret(&mut params), Err(WardenError::InvalidQuerystring(_))),
                "page={} size={}",
                page,
                size
            );
        }
        let mut params = SearchParams {
            page: Some(100),
            size: Some(100),
            ..SearchParams::default()
        };
        assert!(interpret(&mut params).is_ok());
    }

    #[test]
    fn next_page_stops_at_total_and_cap() {
        let p = Pagination::new(1, 10, 30);
        assert!(p.has_next(11));
        assert!(!p.has_next(10));
        assert_eq!(Pagination::new(3, 10, 30).next_page(100), None);
        assert_eq!(Pagination::new(2, 10, 30).prev_page(), Some(1));
        assert_eq!(Pagination::new(1, 10, 30).prev_page(), None);
    }

    #[test]
    fn role_without_agent_targets_the_caller() {
        let registry = Arc::new(AgentRegistry::default());
        let interpreter = FilterParam::new(registry);
        let mut params = SearchParams {
            role: Some("owner".to_string()),
            ..SearchParams::default()
        };
        let mut query = RecordQuery::default();
        interpreter
            .apply(&Identity::user(4), &mut query, &mut params)
            .unwrap();
        assert_eq!(query.filter.role, Some(AccessRole::Owner));
        assert_eq!(query.filter.agent.unwrap().to_string(), "user:4");
        assert_eq!(query.filter.user_id, None);

        let err = interpreter
            .apply(&Identity::anonymous(), &mut RecordQuery::default(), &mut params)
            .unwrap_err();
        assert!(matches!(err, WardenError::InvalidQuerystring(_)));
    }
}
