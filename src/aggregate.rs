//! Aggregate parser for the `agregate` parameter.
//!
//! The parameter carries exactly one aggregate:
//!
//! ```text
//! sourcePathCol, function, alias, groupPathCol, flag
//! orders.amount, SUM,      spent, customer_id,  1
//! ```
//!
//! `groupPathCol` and `flag` may be empty or omitted. A set flag aggregates
//! over distinct values.

use crate::error::{Result, TranslateError};
use crate::naming::to_column_case;
use crate::path::{resolve_segments, split_path_column};
use crate::plan::{AggregateSpec, GroupBy, IncludeTree, NodeId};
use crate::registry::ModelRegistry;
use tracing::debug;

const PARAM: &str = "agregate";

pub fn parse_aggregate(
    input: &str,
    include: &mut IncludeTree,
    registry: &ModelRegistry,
) -> Result<(AggregateSpec, Option<GroupBy>)> {
    let fields: Vec<&str> = input.split(',').map(str::trim).collect();
    if !(3..=5).contains(&fields.len()) {
        return Err(TranslateError::invalid(
            PARAM,
            input,
            "expected sourcePathCol,function,alias[,groupPathCol[,flag]]",
        ));
    }

    let (source_segments, source_column) = split_path_column(fields[0]);
    if source_column.is_empty() {
        return Err(TranslateError::invalid(PARAM, input, "missing source column"));
    }

    let function = fields[1];
    if function.is_empty() || !function.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(TranslateError::invalid(PARAM, function, "function must be a plain identifier"));
    }

    let alias = fields[2];
    if alias.is_empty() {
        return Err(TranslateError::invalid(PARAM, input, "missing alias"));
    }

    let distinct = match fields.get(4).copied().unwrap_or_default() {
        "" | "0" | "false" => false,
        "1" | "true" => true,
        other => return Err(TranslateError::invalid(PARAM, other, "flag must be 0 or 1")),
    };

    let source = resolve_segments(include, NodeId::ROOT, &source_segments, registry)?;
    let aggregate = AggregateSpec {
        function: function.to_ascii_uppercase(),
        source_path: include.alias_chain(source),
        source_column: to_column_case(&source_column),
        alias: alias.to_string(),
        distinct,
    };

    let group = match fields.get(3).copied().unwrap_or_default() {
        "" => None,
        group_pathcol => {
            let (group_segments, group_column) = split_path_column(group_pathcol);
            if group_column.is_empty() {
                return Err(TranslateError::invalid(PARAM, group_pathcol, "missing group column"));
            }
            let node = resolve_segments(include, NodeId::ROOT, &group_segments, registry)?;
            Some(GroupBy {
                path: include.alias_chain(node),
                column: to_column_case(&group_column),
            })
        }
    };

    debug!(aggregate = %aggregate.expression(), grouped = group.is_some(), "parsed aggregate");
    Ok((aggregate, group))
}
