//! Query plan assembly.
//!
//! ```text
//! translate(route, params)
//!   ├─ registry.model_for_route()        → QueryPlan::new(model)
//!   ├─ include    → path::resolve()       (explicit joins)
//!   ├─ where      → parser::parse_where() (joins implied by the filter, then the filter)
//!   ├─ attributes → attributes::parse_attributes()
//!   ├─ agregate   → aggregate::parse_aggregate()
//!   ├─ order      → order::parse_order()
//!   └─ limit / offset / raw / count / logging
//! ```
//!
//! When the filter reaches into a joined table the database may return several
//! rows per root row, so `limit`/`offset` are not put on the plan; the caller
//! gets them back as [`Translation::deferred_pagination`] and applies them to
//! the materialized rows.

use crate::access::{AccessPolicy, Method};
use crate::aggregate::parse_aggregate;
use crate::attributes::parse_attributes;
use crate::config::{ConfigError, ServiceConfig};
use crate::error::{Result, TranslateError};
use crate::order::parse_order;
use crate::parser::parse_where;
use crate::path::resolve;
use crate::plan::{NodeId, QueryPlan};
use crate::params::QueryParams;
use crate::registry::ModelRegistry;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Pagination {
    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.offset.is_none()
    }

    /// Applies the window to rows that were fetched without it.
    pub fn apply<T>(&self, rows: Vec<T>) -> Vec<T> {
        let skip = self.offset.map_or(0, |o| usize::try_from(o).unwrap_or(usize::MAX));
        let take = self.limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        rows.into_iter().skip(skip).take(take).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub plan: QueryPlan,
    /// Some filter clause referenced a joined table.
    pub has_nested_filter: bool,
    /// The requested window, whether or not it was put on the plan.
    pub pagination: Pagination,
}

impl Translation {
    /// The window the caller must apply itself, if any.
    pub fn deferred_pagination(&self) -> Option<Pagination> {
        (self.has_nested_filter && !self.pagination.is_empty()).then_some(self.pagination)
    }
}

#[derive(Debug, Clone)]
pub struct Translator {
    registry: Arc<ModelRegistry>,
    policy: Arc<AccessPolicy>,
    strict_filters: bool,
}

impl Translator {
    pub fn new(registry: Arc<ModelRegistry>, policy: Arc<AccessPolicy>) -> Self {
        Self {
            registry,
            policy,
            strict_filters: false,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> std::result::Result<Self, ConfigError> {
        let translator = Self::new(Arc::new(config.registry()?), Arc::new(config.access_policy()))
            .with_strict_filters(config.strict_filters);
        Ok(translator)
    }

    /// Report malformed `where` input as an error instead of dropping the filter.
    pub fn with_strict_filters(mut self, strict: bool) -> Self {
        self.strict_filters = strict;
        self
    }

    /// Checks the route's table against the allow-list for `method`.
    pub fn authorize(&self, method: Method, route: &str) -> Result<()> {
        let model = self.registry.model_for_route(route)?;
        self.policy.check(method, &model.table)
    }

    pub fn translate(&self, route: &str, params: &QueryParams) -> Result<Translation> {
        let registry = self.registry.as_ref();
        let model = registry.model_for_route(route)?;
        let mut plan = QueryPlan::new(model.name.clone());

        if let Some(include) = present(&params.include) {
            for path in strip_brackets(include).split(',') {
                resolve(&mut plan.include, NodeId::ROOT, path.trim(), registry)?;
            }
            debug!(joins = plan.include.len() - 1, "resolved include paths");
        }

        let mut has_nested_filter = false;
        if let Some(filter) = present(&params.filter) {
            match parse_where(strip_wrapper(filter), &mut plan.include, registry) {
                Ok(parsed) => {
                    has_nested_filter = parsed.has_nested_filter;
                    plan.filter = Some(parsed.tree);
                }
                Err(err @ TranslateError::MalformedFilter { .. }) if !self.strict_filters => {
                    warn!(%err, "ignoring malformed where clause");
                }
                Err(err) => return Err(err),
            }
        }

        if let Some(attributes) = present(&params.attributes) {
            parse_attributes(attributes, &mut plan.include, registry)?;
        }

        if let Some(aggregate) = present(&params.aggregate) {
            let (aggregate, group) = parse_aggregate(strip_brackets(aggregate), &mut plan.include, registry)?;
            plan.aggregate = Some(aggregate);
            plan.group = group;
        }

        if let Some(order) = present(&params.order) {
            plan.order = parse_order(order, &mut plan.include, registry)?;
        }

        let pagination = Pagination {
            limit: present(&params.limit).map(|v| parse_u64("limit", v)).transpose()?,
            offset: present(&params.offset).map(|v| parse_u64("offset", v)).transpose()?,
        };
        if !has_nested_filter {
            plan.limit = pagination.limit;
            plan.offset = pagination.offset;
        }

        plan.raw = present(&params.raw).map(|v| parse_bool("raw", v)).transpose()?.unwrap_or(false);
        plan.count = present(&params.count).map(|v| parse_bool("count", v)).transpose()?.unwrap_or(false);
        plan.logging = true;

        info!(
            model = %plan.model,
            joins = plan.include.len() - 1,
            has_nested_filter,
            "translated query"
        );

        Ok(Translation {
            plan,
            has_nested_filter,
            pagination,
        })
    }
}

/// Absent and empty parameters are treated alike.
fn present(param: &Option<String>) -> Option<&str> {
    param.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// `[a,b]` -> `a,b`
fn strip_brackets(s: &str) -> &str {
    s.strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .unwrap_or(s)
}

/// `[[a,eq,1]OR[b,eq,2]]` -> `[a,eq,1]OR[b,eq,2]`; a bare clause list is kept.
fn strip_wrapper(s: &str) -> &str {
    if s.starts_with("[[") && s.ends_with("]]") {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn parse_u64(name: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| TranslateError::invalid(name, value, "expected a non-negative integer"))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(TranslateError::invalid(name, value, "expected true or false")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::EnabledTables;
    use crate::plan::{Direction, FilterValue};
    use crate::registry::tests::shop_registry;
    use serde_json::json;

    fn translator() -> Translator {
        let policy = AccessPolicy::from(&EnabledTables {
            get: vec!["customers".to_string(), "orders".to_string()],
            ..Default::default()
        });
        Translator::new(Arc::new(shop_registry()), Arc::new(policy))
    }

    fn translate(query: &str) -> Result<Translation> {
        translator().translate("customers", &QueryParams::from_query_string(query))
    }

    #[test]
    fn test_empty_request() {
        let translation = translate("").unwrap();
        assert_eq!(
            serde_json::to_value(&translation.plan).unwrap(),
            json!({ "model": "Customers", "raw": false, "count": false, "logging": true })
        );
        assert!(!translation.has_nested_filter);
        assert_eq!(translation.deferred_pagination(), None);
    }

    #[test]
    fn test_full_request() {
        let translation = translate(
            "include=orders.line_items\
             &where=[status,eq,active]AND[orders.total,gt,100]OR[name,like,%25a%25]\
             &attributes=,id,name;orders,total\
             &agregate=orders.total,SUM,spent,id,0\
             &order=orders.created_at,DESC;name,ASC\
             &limit=20&offset=40&raw=true&count=1",
        )
        .unwrap();

        assert!(translation.has_nested_filter);
        assert_eq!(
            translation.deferred_pagination(),
            Some(Pagination {
                limit: Some(20),
                offset: Some(40)
            })
        );
        assert_eq!(
            serde_json::to_value(&translation.plan).unwrap(),
            json!({
                "model": "Customers",
                "include": [{
                    "model": "Orders",
                    "as": "Orders",
                    "attributes": ["total"],
                    "include": [{ "model": "LineItems", "as": "LineItems" }]
                }],
                "where": { "$or": [
                    { "$and": [{ "status": { "eq": "active" } }, { "$Orders.total$": { "gt": "100" } }] },
                    { "$and": [{ "name": { "like": "%a%" } }] }
                ]},
                "attributes": ["id", "name", { "fn": "SUM", "col": "Orders.total", "as": "spent", "distinct": false }],
                "group": "Customers.id",
                "order": [["Orders", "created_at", "DESC"], ["name", "ASC"]],
                "raw": true,
                "count": true,
                "logging": true
            })
        );
    }

    #[test]
    fn test_root_filter_keeps_pagination_on_plan() {
        let translation = translate("where=[status,eq,1]&limit=20&offset=0").unwrap();
        assert!(!translation.has_nested_filter);
        assert_eq!(translation.plan.limit, Some(20));
        assert_eq!(translation.plan.offset, Some(0));
        assert_eq!(translation.deferred_pagination(), None);
    }

    #[test]
    fn test_nested_filter_defers_pagination() {
        let translation = translate("where=[orders.total,gt,5]&limit=2").unwrap();
        assert!(translation.has_nested_filter);
        assert_eq!(translation.plan.limit, None);

        let deferred = translation.deferred_pagination().unwrap();
        assert_eq!(deferred.apply(vec![1, 2, 3, 4]), vec![1, 2]);
    }

    #[test]
    fn test_pagination_apply() {
        let window = Pagination {
            limit: Some(2),
            offset: Some(1),
        };
        assert_eq!(window.apply(vec!['a', 'b', 'c', 'd']), vec!['b', 'c']);
        assert_eq!(Pagination::default().apply(vec![1, 2]), vec![1, 2]);
        assert!(Pagination { limit: Some(5), offset: Some(10) }.apply(vec![1, 2]).is_empty());
    }

    #[test]
    fn test_include_and_filter_share_joins() {
        let translation = translate("include=[orders,orders.line_items]&where=[orders.line_items.qty,gt,1]").unwrap();
        assert_eq!(translation.plan.include.len(), 3);
    }

    #[test]
    fn test_wrapped_where() {
        let translation = translate("where=[[a,eq,1]OR[b,eq,null]]").unwrap();
        let filter = translation.plan.filter.unwrap();
        assert_eq!(filter.groups.len(), 2);
        assert_eq!(filter.groups[1].conditions[0].value, FilterValue::Null);
    }

    #[test]
    fn test_malformed_where_is_dropped_by_default() {
        let translation = translate("where=[a,eq,1]XOR[b,eq,2]&limit=5").unwrap();
        assert_eq!(translation.plan.filter, None);
        assert_eq!(translation.plan.limit, Some(5));
    }

    #[test]
    fn test_malformed_where_fails_when_strict() {
        let err = translator()
            .with_strict_filters(true)
            .translate("customers", &QueryParams::from_query_string("where=[a,eq,1]XOR[b,eq,2]"))
            .unwrap_err();
        assert!(matches!(err, TranslateError::MalformedFilter { position: 8, .. }));
    }

    #[test]
    fn test_unknown_path_is_not_tolerated() {
        assert!(matches!(
            translate("where=[coupons.code,eq,X]"),
            Err(TranslateError::UnknownPath { .. })
        ));
    }

    #[test]
    fn test_paths_outside_declared_relations_are_rejected() {
        for query in [
            "where=[orders.products.sku,eq,1]",
            "include=orders:nosuch",
            "include=products",
            "attributes=products,sku",
            "order=orders.products.sku,ASC",
            "agregate=orders.products.price,SUM,t",
        ] {
            assert!(
                matches!(translate(query), Err(TranslateError::UnknownPath { .. })),
                "query {query}"
            );
        }
    }

    #[test]
    fn test_invalid_scalars() {
        assert_eq!(
            translate("limit=ten").unwrap_err(),
            TranslateError::InvalidParameter {
                name: "limit".to_string(),
                value: "ten".to_string(),
                reason: "expected a non-negative integer".to_string(),
            }
        );
        assert!(matches!(translate("offset=-1"), Err(TranslateError::InvalidParameter { .. })));
        assert!(matches!(translate("raw=maybe"), Err(TranslateError::InvalidParameter { .. })));
    }

    #[test]
    fn test_empty_parameters_are_absent() {
        let translation = translate("where=&attributes=&order=&limit=").unwrap();
        assert_eq!(translation.plan.filter, None);
        assert_eq!(translation.plan.attributes(), None);
        assert!(translation.plan.order.is_empty());
        assert_eq!(translation.plan.limit, None);
    }

    #[test]
    fn test_order_parameter() {
        let translation = translate("order=a,ASC;b,DESC").unwrap();
        let order: Vec<_> = translation
            .plan
            .order
            .iter()
            .map(|e| (e.column.as_str(), e.direction))
            .collect();
        assert_eq!(order, vec![("a", Direction::Asc), ("b", Direction::Desc)]);
    }

    #[test]
    fn test_aggregate_on_root_without_group() {
        let translation = translate("agregate=amount,SUM,total,,0").unwrap();
        let aggregate = translation.plan.aggregate.as_ref().unwrap();
        assert!(aggregate.source_path.is_empty());
        assert_eq!(translation.plan.group, None);
        assert_eq!(translation.plan.include.len(), 1);
    }

    #[test]
    fn test_unknown_model() {
        assert_eq!(
            translator().translate("invoices", &QueryParams::default()),
            Err(TranslateError::ModelNotFound("Invoices".to_string()))
        );
    }

    #[test]
    fn test_authorize() {
        let translator = translator();
        assert!(translator.authorize(Method::Get, "orders").is_ok());
        assert!(matches!(
            translator.authorize(Method::Get, "products"),
            Err(TranslateError::Forbidden { .. })
        ));
        assert!(matches!(
            translator.authorize(Method::Delete, "orders"),
            Err(TranslateError::Forbidden { .. })
        ));
    }
}
