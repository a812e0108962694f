//! Join path resolution and the small splitting helpers shared by the
//! path-bearing parsers.

use crate::error::{Result, TranslateError};
use crate::naming::to_pascal_join_name;
use crate::plan::{IncludeTree, NodeId};
use crate::registry::ModelRegistry;
use tracing::trace;

/// Walks `dotted` (e.g. `orders.line_items`) from `from`, reusing existing
/// nodes and creating missing ones. Returns the deepest node.
///
/// Every segment must name a relation declared on the model reached so far,
/// and that relation must target the segment's model; anything else is
/// [`TranslateError::UnknownPath`].
///
/// A segment may carry a discriminator, `orders:billing`, so that the same
/// table can be joined twice. The discriminated segment is the node's alias;
/// only the part before the colon names the model.
pub fn resolve(
    tree: &mut IncludeTree,
    from: NodeId,
    dotted: &str,
    registry: &ModelRegistry,
) -> Result<NodeId> {
    if dotted.is_empty() {
        return Ok(from);
    }
    let segments: Vec<&str> = dotted.split('.').collect();
    resolve_segments(tree, from, &segments, registry)
}

/// Same as [`resolve`] for a path that is already split.
pub fn resolve_segments<S: AsRef<str>>(
    tree: &mut IncludeTree,
    from: NodeId,
    segments: &[S],
    registry: &ModelRegistry,
) -> Result<NodeId> {
    let mut current = from;

    for segment in segments {
        let segment = segment.as_ref().trim();
        let table = segment.split(':').next().unwrap_or_default();
        let model = to_pascal_join_name(table);
        let alias = to_pascal_join_name(segment);

        let related = registry
            .get(&tree.node(current).model)
            .and_then(|parent| parent.relation(&alias))
            .is_some_and(|relation| relation.target == model);
        if table.is_empty() || !related {
            return Err(TranslateError::UnknownPath {
                path: join_segments(segments),
                segment: segment.to_string(),
            });
        }

        current = match tree.child_by_alias(current, &alias) {
            Some(existing) => existing,
            None => {
                trace!(%alias, %model, "adding join node");
                tree.add_child(current, model, alias)
            }
        };
    }

    Ok(current)
}

fn join_segments<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(".")
}

/// `orders.line_items.qty` -> (`["orders", "line_items"]`, `qty`)
pub fn split_path_column(pathcol: &str) -> (Vec<String>, String) {
    match pathcol.trim().rsplit_once('.') {
        Some((path, column)) => (
            path.split('.').map(str::to_string).collect(),
            column.to_string(),
        ),
        None => (Vec::new(), pathcol.trim().to_string()),
    }
}

/// Splits `a,b;c,d` (or `[a,b];[c,d]`) into its `;`-separated groups with
/// surrounding brackets removed. Empty groups are skipped.
pub fn split_groups(input: &str) -> impl Iterator<Item = &str> {
    input
        .split(';')
        .map(|group| group.trim().trim_start_matches('[').trim_end_matches(']'))
        .filter(|group| !group.is_empty())
}
