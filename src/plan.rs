//! The query plan: an engine-agnostic description of one request's query.
//!
//! A plan is built fresh for every request by [`crate::translator::Translator`],
//! handed to the data-access layer once, and dropped. Its JSON form (see the
//! `Serialize` impls below) is the contract other layers depend on:
//!
//! ```text
//! {
//!   "model": "Orders",
//!   "include": [{ "model": "Customers", "as": "Customers", "attributes": ["name"] }],
//!   "where": { "$or": [{ "$and": [{ "status": { "eq": "open" } }] }] },
//!   "attributes": ["id", { "fn": "SUM", "col": "total", "as": "sum", "distinct": false }],
//!   "group": "Orders.customer_id",
//!   "order": [["Customers", "name", "ASC"]],
//!   "limit": 20, "offset": 0, "raw": false, "count": false, "logging": true
//! }
//! ```

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Index of a join node inside an [`IncludeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

/// A joined ("included") model.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinNode {
    /// Canonical name of the model this node loads.
    pub model: String,
    /// Name the node is matched and included under; may carry a `:discriminator`.
    pub alias: String,
    /// Dotted alias chain from the root, e.g. `Orders.LineItems`. Empty for the root.
    pub path: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Projected columns; `None` means every column.
    pub attributes: Option<Vec<String>>,
}

/// Arena of join nodes. Node 0 is the root model itself.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeTree {
    nodes: Vec<JoinNode>,
}

impl IncludeTree {
    pub fn new(root_model: impl Into<String>) -> Self {
        let model = root_model.into();
        Self {
            nodes: vec![JoinNode {
                alias: model.clone(),
                model,
                path: String::new(),
                parent: None,
                children: Vec::new(),
                attributes: None,
            }],
        }
    }

    pub fn root(&self) -> &JoinNode {
        &self.nodes[0]
    }

    pub fn node(&self, id: NodeId) -> &JoinNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut JoinNode {
        &mut self.nodes[id.0]
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn child_by_alias(&self, parent: NodeId, alias: &str) -> Option<NodeId> {
        self.node(parent)
            .children
            .iter()
            .copied()
            .find(|&child| self.node(child).alias == alias)
    }

    /// Appends a new child under `parent`. Callers are expected to check
    /// [`Self::child_by_alias`] first.
    pub fn add_child(&mut self, parent: NodeId, model: String, alias: String) -> NodeId {
        let parent_path = &self.node(parent).path;
        let path = if parent_path.is_empty() {
            alias.clone()
        } else {
            format!("{parent_path}.{alias}")
        };

        let id = NodeId(self.nodes.len());
        self.nodes.push(JoinNode {
            model,
            alias,
            path,
            parent: Some(parent),
            children: Vec::new(),
            attributes: None,
        });
        self.node_mut(parent).children.push(id);
        id
    }

    /// Alias chain of a node, root excluded.
    pub fn alias_chain(&self, id: NodeId) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            if node_id.is_root() {
                break;
            }
            let node = self.node(node_id);
            chain.push(node.alias.clone());
            current = node.parent;
        }
        chain.reverse();
        chain
    }

    /// Every non-root node, parents before children.
    pub fn joins(&self) -> impl Iterator<Item = (NodeId, &JoinNode)> {
        self.nodes
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, node)| (NodeId(i), node))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

/// The value side of a condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Absence of a value (`null` in the DSL, any casing).
    Null,
    One(String),
    /// Two or more values, for operators such as `between` or `in`.
    Many(Vec<String>),
}

/// One `[path.column,operator,value...]` clause as written by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionClause {
    pub path: Vec<String>,
    pub column: String,
    pub operator: String,
    pub value: FilterValue,
    pub connective: Connective,
}

/// A condition inside an AND group, with its path resolved to join aliases.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Alias chain of the join the column belongs to; empty for the root.
    pub path: Vec<String>,
    pub column: String,
    pub operator: String,
    pub value: FilterValue,
}

impl Condition {
    /// `status` for root columns, `$Orders.LineItems.qty$` for joined ones.
    pub fn field_key(&self) -> String {
        if self.path.is_empty() {
            self.column.clone()
        } else {
            format!("${}.{}$", self.path.join("."), self.column)
        }
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct OperatorValue<'a>(&'a str, &'a FilterValue);

        impl Serialize for OperatorValue<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(self.0, self.1)?;
                map.end()
            }
        }

        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.field_key(), &OperatorValue(&self.operator, &self.value))?;
        map.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AndGroup {
    #[serde(rename = "$and")]
    pub conditions: Vec<Condition>,
}

/// OR of AND groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterTree {
    #[serde(rename = "$or")]
    pub groups: Vec<AndGroup>,
}

impl FilterTree {
    /// Folds conditions left to right. `And` appends to the last (open) group;
    /// `Or` opens a new group, unless the open group is still empty.
    pub fn fold<I>(conditions: I) -> Self
    where
        I: IntoIterator<Item = (Connective, Condition)>,
    {
        let groups = conditions.into_iter().fold(
            vec![AndGroup::default()],
            |mut groups, (connective, condition)| {
                let open_is_empty = groups.last().is_some_and(|g| g.conditions.is_empty());
                if connective == Connective::Or && !open_is_empty {
                    groups.push(AndGroup {
                        conditions: vec![condition],
                    });
                } else if let Some(open) = groups.last_mut() {
                    open.conditions.push(condition);
                }
                groups
            },
        );
        Self { groups }
    }

    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.groups.iter().flat_map(|g| g.conditions.iter())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSpec {
    /// Upper-cased function name, e.g. `SUM`.
    pub function: String,
    pub source_path: Vec<String>,
    pub source_column: String,
    pub alias: String,
    pub distinct: bool,
}

impl AggregateSpec {
    /// Column reference qualified by the source alias chain, bare for the root.
    pub fn qualified_column(&self) -> String {
        qualify(&self.source_path, &self.source_column)
    }

    /// `SUM(Orders.amount)` or `COUNT(DISTINCT id)`.
    pub fn expression(&self) -> String {
        let distinct = if self.distinct { "DISTINCT " } else { "" };
        format!("{}({}{})", self.function, distinct, self.qualified_column())
    }
}

impl Serialize for AggregateSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry("fn", &self.function)?;
        map.serialize_entry("col", &self.qualified_column())?;
        map.serialize_entry("as", &self.alias)?;
        map.serialize_entry("distinct", &self.distinct)?;
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupBy {
    /// Alias chain of the grouped column; empty means the root model.
    pub path: Vec<String>,
    pub column: String,
}

impl GroupBy {
    pub fn qualified(&self, root_model: &str) -> String {
        if self.path.is_empty() {
            format!("{root_model}.{}", self.column)
        } else {
            qualify(&self.path, &self.column)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderEntry {
    pub path: Vec<String>,
    pub column: String,
    pub direction: Direction,
}

/// `["Customers", "name", "ASC"]`
impl Serialize for OrderEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.path.len() + 2))?;
        for alias in &self.path {
            seq.serialize_element(alias)?;
        }
        seq.serialize_element(&self.column)?;
        seq.serialize_element(&self.direction)?;
        seq.end()
    }
}

fn qualify(path: &[String], column: &str) -> String {
    if path.is_empty() {
        column.to_string()
    } else {
        format!("{}.{}", path.join("."), column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    /// Canonical name of the queried model.
    pub model: String,
    pub include: IncludeTree,
    pub filter: Option<FilterTree>,
    pub aggregate: Option<AggregateSpec>,
    pub group: Option<GroupBy>,
    pub order: Vec<OrderEntry>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Hand back plain rows instead of materialized model objects.
    pub raw: bool,
    /// Also report the total number of matching rows.
    pub count: bool,
    pub logging: bool,
}

impl QueryPlan {
    pub fn new(model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            include: IncludeTree::new(model.clone()),
            model,
            filter: None,
            aggregate: None,
            group: None,
            order: Vec::new(),
            limit: None,
            offset: None,
            raw: false,
            count: false,
            logging: false,
        }
    }

    /// Root projection; `None` selects every column.
    pub fn attributes(&self) -> Option<&[String]> {
        self.include.root().attributes.as_deref()
    }
}

struct IncludeList<'a> {
    tree: &'a IncludeTree,
    ids: &'a [NodeId],
}

impl Serialize for IncludeList<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.ids.iter().map(|&id| IncludeEntry {
            tree: self.tree,
            id,
        }))
    }
}

struct IncludeEntry<'a> {
    tree: &'a IncludeTree,
    id: NodeId,
}

impl Serialize for IncludeEntry<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let node = self.tree.node(self.id);
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("model", &node.model)?;
        map.serialize_entry("as", &node.alias)?;
        if let Some(attributes) = &node.attributes {
            map.serialize_entry("attributes", attributes)?;
        }
        if !node.children.is_empty() {
            map.serialize_entry(
                "include",
                &IncludeList {
                    tree: self.tree,
                    ids: &node.children,
                },
            )?;
        }
        map.end()
    }
}

/// Root columns followed by the aggregate, if any.
struct Attributes<'a> {
    columns: &'a [String],
    aggregate: Option<&'a AggregateSpec>,
}

impl Serialize for Attributes<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.columns.len() + usize::from(self.aggregate.is_some());
        let mut seq = serializer.serialize_seq(Some(len))?;
        for column in self.columns {
            seq.serialize_element(column)?;
        }
        if let Some(aggregate) = self.aggregate {
            seq.serialize_element(aggregate)?;
        }
        seq.end()
    }
}

impl Serialize for QueryPlan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("model", &self.model)?;

        let root = self.include.root();
        if !root.children.is_empty() {
            map.serialize_entry(
                "include",
                &IncludeList {
                    tree: &self.include,
                    ids: &root.children,
                },
            )?;
        }
        if let Some(filter) = &self.filter {
            map.serialize_entry("where", filter)?;
        }
        if self.attributes().is_some() || self.aggregate.is_some() {
            map.serialize_entry(
                "attributes",
                &Attributes {
                    columns: self.attributes().unwrap_or(&[]),
                    aggregate: self.aggregate.as_ref(),
                },
            )?;
        }
        if let Some(group) = &self.group {
            map.serialize_entry("group", &group.qualified(&self.model))?;
        }
        if !self.order.is_empty() {
            map.serialize_entry("order", &self.order)?;
        }
        if let Some(limit) = self.limit {
            map.serialize_entry("limit", &limit)?;
        }
        if let Some(offset) = self.offset {
            map.serialize_entry("offset", &offset)?;
        }
        map.serialize_entry("raw", &self.raw)?;
        map.serialize_entry("count", &self.count)?;
        map.serialize_entry("logging", &self.logging)?;
        map.end()
    }
}
