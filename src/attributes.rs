//! Projection parser for the `attributes` parameter.
//!
//! `,id,name;orders,total,id` selects `id, name` on the root model and
//! `total, id` on the `Orders` join. Groups naming the same path accumulate.

use crate::error::{Result, TranslateError};
use crate::naming::to_column_case;
use crate::path::{resolve, split_groups};
use crate::plan::{IncludeTree, NodeId};
use crate::registry::ModelRegistry;
use tracing::debug;

pub fn parse_attributes(
    input: &str,
    include: &mut IncludeTree,
    registry: &ModelRegistry,
) -> Result<()> {
    for group in split_groups(input) {
        let mut tokens = group.split(',');
        let path = tokens.next().unwrap_or_default().trim();
        let columns = tokens
            .map(|column| {
                let column = column.trim();
                if column.is_empty() {
                    Err(TranslateError::MalformedGroup {
                        parameter: "attributes".to_string(),
                        group: group.to_string(),
                    })
                } else {
                    Ok(to_column_case(column))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let node = resolve(include, NodeId::ROOT, path, registry)?;
        debug!(path, columns = ?columns, "projecting columns");
        include
            .node_mut(node)
            .attributes
            .get_or_insert_with(Vec::new)
            .extend(columns);
    }
    Ok(())
}
