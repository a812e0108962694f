//! Order parser for the `order` parameter: `orders.created_at,DESC;name,ASC`.

use crate::error::{Result, TranslateError};
use crate::naming::to_column_case;
use crate::path::{resolve_segments, split_groups, split_path_column};
use crate::plan::{Direction, IncludeTree, NodeId, OrderEntry};
use crate::registry::ModelRegistry;

fn parse_direction(s: &str) -> Result<Direction> {
    match s.trim().to_ascii_uppercase().as_str() {
        "" | "ASC" => Ok(Direction::Asc),
        "DESC" => Ok(Direction::Desc),
        _ => Err(TranslateError::invalid("order", s, "direction must be ASC or DESC")),
    }
}

/// Entries come back in input order.
pub fn parse_order(
    input: &str,
    include: &mut IncludeTree,
    registry: &ModelRegistry,
) -> Result<Vec<OrderEntry>> {
    split_groups(input)
        .map(|group| {
            let (pathcol, direction) = match group.split_once(',') {
                Some((pathcol, direction)) => (pathcol, direction),
                None => (group, ""),
            };

            let (segments, column) = split_path_column(pathcol);
            if column.is_empty() {
                return Err(TranslateError::MalformedGroup {
                    parameter: "order".to_string(),
                    group: group.to_string(),
                });
            }

            let node = resolve_segments(include, NodeId::ROOT, &segments, registry)?;
            Ok(OrderEntry {
                path: include.alias_chain(node),
                column: to_column_case(&column),
                direction: parse_direction(direction)?,
            })
        })
        .collect()
}
