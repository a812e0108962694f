//! SQL compiler that renders a [`QueryPlan`] into parameterized SQL using sea-query.
//!
//! Every join node becomes a `LEFT JOIN` aliased by its dotted path
//! (`"Orders.LineItems"`), and the root table is aliased by the model name, so
//! the column references in the plan map one to one onto SQL identifiers.

use crate::config::Dialect;
use crate::plan::{
    AggregateSpec, Condition, Direction, FilterTree, FilterValue, JoinNode, NodeId, QueryPlan,
};
use crate::registry::{ModelHandle, ModelRegistry, Relation};
use sea_query::{
    Asterisk, Cond, Expr, Func, JoinType, MysqlQueryBuilder, Order, PostgresQueryBuilder, Query,
    SelectStatement, SimpleExpr, SqliteQueryBuilder, Value, Values,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Configuration for SQL optimization
#[derive(Debug, Clone)]
pub struct OptimizationConfig {
    /// Minimum number of single-equality OR groups on one column before they are
    /// rewritten into an IN clause
    pub max_or_conditions_for_in: usize,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            max_or_conditions_for_in: 5,
        }
    }
}

/// Table identifier for sea-query
#[derive(Debug, Clone)]
pub struct TableName(pub String);

impl sea_query::Iden for TableName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        let _ = s.write_str(&self.0);
    }
}

/// Column identifier wrapper
#[derive(Debug, Clone)]
pub struct ColumnName(pub String);

impl sea_query::Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        let _ = s.write_str(&self.0);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("model '{0}' is not registered")]
    UnknownModel(String),

    #[error("model '{model}' has no relation '{alias}'")]
    RelationNotFound { model: String, alias: String },

    #[error("unsupported operator '{0}'")]
    UnsupportedOperator(String),

    #[error("invalid operand for '{operator}' on {column}: {reason}")]
    InvalidOperand {
        operator: String,
        column: String,
        reason: String,
    },
}

/// Represents an optimization applied during compilation
#[derive(Debug, Clone, PartialEq)]
pub enum Optimization {
    OrToIn { column: String, value_count: usize },
}

/// One rendered statement.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    /// SQL with placeholders
    pub sql: String,
    pub values: Values,
    /// SQL with the values inlined, for logs and the REPL only
    pub display_sql: String,
}

/// Result of SQL compilation with optimization information
#[derive(Debug, Clone)]
pub struct CompileResult {
    pub query: RenderedQuery,
    /// Row count query, present when the plan asks for a count
    pub count: Option<RenderedQuery>,
    pub optimizations: Vec<Optimization>,
}

/// SQL Compiler that converts query plans to SQL queries
#[derive(Debug, Clone)]
pub struct SqlCompiler {
    registry: Arc<ModelRegistry>,
    dialect: Dialect,
    config: OptimizationConfig,
}

impl SqlCompiler {
    pub fn new(registry: Arc<ModelRegistry>, dialect: Dialect) -> Self {
        Self {
            registry,
            dialect,
            config: OptimizationConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OptimizationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn compile(&self, plan: &QueryPlan) -> Result<CompileResult, CompileError> {
        let mut optimizations = Vec::new();
        let select = self.select_statement(plan, &mut optimizations)?;
        let query = self.render(&select);

        let count = if plan.count {
            let count = self.count_statement(plan, &mut Vec::new())?;
            Some(self.render(&count))
        } else {
            None
        };

        debug!(sql = %query.display_sql, optimizations = optimizations.len(), "compiled plan");
        Ok(CompileResult {
            query,
            count,
            optimizations,
        })
    }

    /// Builds the main `SELECT` for a plan.
    pub fn select_statement(
        &self,
        plan: &QueryPlan,
        optimizations: &mut Vec<Optimization>,
    ) -> Result<SelectStatement, CompileError> {
        let mut select = self.base_statement(plan, optimizations)?;

        let aggregating = plan.aggregate.is_some();
        for (id, node) in std::iter::once((NodeId::ROOT, plan.include.root()))
            .chain(plan.include.joins())
        {
            let table = table_alias(plan, &node.path);
            match &node.attributes {
                Some(columns) => {
                    for column in columns {
                        if id.is_root() {
                            select.column((TableName(table.clone()), ColumnName(column.clone())));
                        } else {
                            select.expr_as(
                                Expr::col((TableName(table.clone()), ColumnName(column.clone()))),
                                ColumnName(format!("{}.{}", node.path, column)),
                            );
                        }
                    }
                }
                // An aggregate query only selects what was asked for.
                None if aggregating => {}
                None => {
                    select.column((TableName(table), Asterisk));
                }
            }
        }

        if let Some(aggregate) = &plan.aggregate {
            select.expr_as(aggregate_expr(plan, aggregate), ColumnName(aggregate.alias.clone()));
        }

        if let Some(group) = &plan.group {
            let table = table_alias(plan, &group.path.join("."));
            let column = (TableName(table), ColumnName(group.column.clone()));
            select.expr_as(Expr::col(column.clone()), ColumnName(group.qualified(&plan.model)));
            select.group_by_col(column);
        }

        for entry in &plan.order {
            let table = table_alias(plan, &entry.path.join("."));
            let order = match entry.direction {
                Direction::Asc => Order::Asc,
                Direction::Desc => Order::Desc,
            };
            select.order_by((TableName(table), ColumnName(entry.column.clone())), order);
        }

        if let Some(limit) = plan.limit {
            select.limit(limit);
        }
        if let Some(offset) = plan.offset {
            select.offset(offset);
        }

        Ok(select)
    }

    /// Row count over the same joins and filter, ignoring projection, order
    /// and pagination. Root rows are only counted distinctly when a
    /// one-to-many join can repeat them and the root has a primary key.
    pub fn count_statement(
        &self,
        plan: &QueryPlan,
        optimizations: &mut Vec<Optimization>,
    ) -> Result<SelectStatement, CompileError> {
        let mut select = self.base_statement(plan, optimizations)?;
        let root = self.model(&plan.model)?;

        let mut fans_out = false;
        for (_, node) in plan.include.joins() {
            fans_out |= self.join_relation(plan, node)?.kind.fans_out();
        }

        let counted: SimpleExpr = match &root.primary_key {
            Some(pk) if fans_out => Expr::cust_with_expr(
                "DISTINCT $1",
                Expr::col((TableName(plan.model.clone()), ColumnName(pk.clone()))),
            ),
            _ => Expr::col(Asterisk).into(),
        };
        select.expr_as(Func::count(counted), ColumnName("count".to_string()));
        Ok(select)
    }

    /// FROM, joins and WHERE shared by the select and count statements.
    fn base_statement(
        &self,
        plan: &QueryPlan,
        optimizations: &mut Vec<Optimization>,
    ) -> Result<SelectStatement, CompileError> {
        let root = self.model(&plan.model)?;
        let mut select = Query::select();
        select.from_as(TableName(root.table.clone()), TableName(plan.model.clone()));

        for (_, node) in plan.include.joins() {
            let parent = parent_of(plan, node);
            let relation = self.join_relation(plan, node)?;
            let target = self.model(&node.model)?;

            let parent_table = table_alias(plan, &parent.path);
            select.join_as(
                JoinType::LeftJoin,
                TableName(target.table.clone()),
                TableName(node.path.clone()),
                Expr::col((TableName(parent_table), ColumnName(relation.source_key.clone())))
                    .equals((TableName(node.path.clone()), ColumnName(relation.target_key.clone()))),
            );
        }

        if let Some(filter) = &plan.filter {
            select.cond_where(self.compile_filter(plan, filter, optimizations)?);
        }

        Ok(select)
    }

    fn model(&self, name: &str) -> Result<&ModelHandle, CompileError> {
        self.registry
            .get(name)
            .ok_or_else(|| CompileError::UnknownModel(name.to_string()))
    }

    /// The relation on the parent model that a join node was created from.
    fn join_relation(&self, plan: &QueryPlan, node: &JoinNode) -> Result<&Relation, CompileError> {
        let parent = parent_of(plan, node);
        self.model(&parent.model)?
            .relation(&node.alias)
            .ok_or_else(|| CompileError::RelationNotFound {
                model: parent.model.clone(),
                alias: node.alias.clone(),
            })
    }

    /// OR of AND groups
    fn compile_filter(
        &self,
        plan: &QueryPlan,
        filter: &FilterTree,
        optimizations: &mut Vec<Optimization>,
    ) -> Result<Cond, CompileError> {
        if let Some((in_expr, optimization)) = self.try_optimize_or_to_in(plan, filter) {
            optimizations.push(optimization);
            return Ok(Cond::all().add(in_expr));
        }

        let mut any = Cond::any();
        for group in &filter.groups {
            let mut all = Cond::all();
            for condition in &group.conditions {
                all = all.add(compile_condition(plan, condition)?);
            }
            any = any.add(all);
        }
        Ok(any)
    }

    /// `[s,eq,a]OR[s,eq,b]OR...` -> `s IN (a, b, ...)` once the group count
    /// reaches the configured threshold.
    fn try_optimize_or_to_in(
        &self,
        plan: &QueryPlan,
        filter: &FilterTree,
    ) -> Option<(SimpleExpr, Optimization)> {
        if filter.groups.len() < self.config.max_or_conditions_for_in.max(2) {
            return None;
        }

        let mut key = None;
        let mut values = Vec::with_capacity(filter.groups.len());
        for group in &filter.groups {
            let [condition] = group.conditions.as_slice() else {
                return None;
            };
            let FilterValue::One(value) = &condition.value else {
                return None;
            };
            if normalize_operator(&condition.operator) != "eq" {
                return None;
            }
            let field = condition.field_key();
            match &key {
                None => key = Some((field, condition)),
                Some((first, _)) if *first == field => {}
                Some(_) => return None,
            }
            values.push(to_value(value));
        }

        let (field, condition) = key?;
        let optimization = Optimization::OrToIn {
            column: field,
            value_count: values.len(),
        };
        Some((column_expr(plan, condition).is_in(values), optimization))
    }

    fn render(&self, select: &SelectStatement) -> RenderedQuery {
        let ((sql, values), display_sql) = match self.dialect {
            Dialect::Postgres => (
                select.build(PostgresQueryBuilder),
                select.to_string(PostgresQueryBuilder),
            ),
            Dialect::Mysql => (
                select.build(MysqlQueryBuilder),
                select.to_string(MysqlQueryBuilder),
            ),
            Dialect::Sqlite => (
                select.build(SqliteQueryBuilder),
                select.to_string(SqliteQueryBuilder),
            ),
        };
        RenderedQuery {
            sql,
            values,
            display_sql,
        }
    }
}

fn parent_of<'a>(plan: &'a QueryPlan, node: &JoinNode) -> &'a JoinNode {
    node.parent
        .map(|parent| plan.include.node(parent))
        .unwrap_or_else(|| plan.include.root())
}

/// SQL alias of the node at `path`; the root is aliased by the model name.
fn table_alias(plan: &QueryPlan, path: &str) -> String {
    if path.is_empty() {
        plan.model.clone()
    } else {
        path.to_string()
    }
}

fn column_expr(plan: &QueryPlan, condition: &Condition) -> Expr {
    let table = table_alias(plan, &condition.path.join("."));
    Expr::col((TableName(table), ColumnName(condition.column.clone())))
}

fn aggregate_expr(plan: &QueryPlan, aggregate: &AggregateSpec) -> SimpleExpr {
    let table = TableName(table_alias(plan, &aggregate.source_path.join(".")));
    let column = if aggregate.source_column == "*" {
        Expr::col((table, Asterisk))
    } else {
        Expr::col((table, ColumnName(aggregate.source_column.clone())))
    };

    let argument: SimpleExpr = if aggregate.distinct {
        Expr::cust_with_expr("DISTINCT $1", column)
    } else {
        column.into()
    };
    Func::cust(ColumnName(aggregate.function.clone())).arg(argument).into()
}

/// `$gte` and `gte` name the same operator.
fn normalize_operator(operator: &str) -> &str {
    operator.strip_prefix('$').unwrap_or(operator)
}

/// Integers and decimals bind as numbers, everything else as text. Zero-padded
/// integers such as postal codes stay text.
fn to_value(raw: &str) -> Value {
    let zero_padded = raw.len() > 1 && raw.starts_with('0') && !raw.starts_with("0.");
    if !zero_padded {
        if let Ok(n) = raw.parse::<i64>() {
            return n.into();
        }
        if raw.contains('.') {
            if let Ok(f) = raw.parse::<f64>() {
                return f.into();
            }
        }
    }
    raw.to_string().into()
}

fn compile_condition(plan: &QueryPlan, condition: &Condition) -> Result<SimpleExpr, CompileError> {
    let operator = normalize_operator(&condition.operator);
    let column = column_expr(plan, condition);
    let invalid = |reason: &str| CompileError::InvalidOperand {
        operator: condition.operator.clone(),
        column: condition.field_key(),
        reason: reason.to_string(),
    };

    let expr = match (operator, &condition.value) {
        ("eq" | "is", FilterValue::Null) => column.is_null(),
        ("ne" | "not", FilterValue::Null) => column.is_not_null(),
        ("is", FilterValue::One(v)) => column.is(parse_bool(v).ok_or_else(|| invalid("expected null, true or false"))?),
        ("not", FilterValue::One(v)) => column.is_not(parse_bool(v).ok_or_else(|| invalid("expected null, true or false"))?),

        ("in" | "notIn", FilterValue::Null) => return Err(invalid("expected one or more values")),
        ("in", FilterValue::One(v)) => column.is_in([to_value(v)]),
        ("in", FilterValue::Many(vs)) => column.is_in(vs.iter().map(|v| to_value(v))),
        ("notIn", FilterValue::One(v)) => column.is_not_in([to_value(v)]),
        ("notIn", FilterValue::Many(vs)) => column.is_not_in(vs.iter().map(|v| to_value(v))),

        ("between" | "notBetween", FilterValue::Many(vs)) if vs.len() == 2 => {
            let (low, high) = (to_value(&vs[0]), to_value(&vs[1]));
            if operator == "between" {
                column.between(low, high)
            } else {
                column.not_between(low, high)
            }
        }
        ("between" | "notBetween", _) => return Err(invalid("expected exactly two values")),

        (_, FilterValue::Null) if is_supported(operator) => {
            return Err(invalid("null is only valid with eq, ne, is and not"))
        }
        (_, FilterValue::Many(_)) if is_supported(operator) => {
            return Err(invalid("expected a single value"))
        }

        ("eq", FilterValue::One(v)) => column.eq(to_value(v)),
        ("ne", FilterValue::One(v)) => column.ne(to_value(v)),
        ("gt", FilterValue::One(v)) => column.gt(to_value(v)),
        ("gte", FilterValue::One(v)) => column.gte(to_value(v)),
        ("lt", FilterValue::One(v)) => column.lt(to_value(v)),
        ("lte", FilterValue::One(v)) => column.lte(to_value(v)),
        ("like", FilterValue::One(v)) => column.like(v.as_str()),
        ("notLike", FilterValue::One(v)) => column.not_like(v.as_str()),
        ("iLike", FilterValue::One(v)) => {
            Expr::expr(Func::lower(column)).like(v.to_lowercase())
        }

        _ => return Err(CompileError::UnsupportedOperator(condition.operator.clone())),
    };

    Ok(expr)
}

fn is_supported(operator: &str) -> bool {
    matches!(
        operator,
        "eq" | "ne" | "gt" | "gte" | "lt" | "lte" | "like" | "notLike" | "iLike" | "is" | "not"
    )
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}
