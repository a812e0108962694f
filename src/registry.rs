//! Registry of queryable models and the relations between them.
//!
//! The registry is built once from configuration and shared read-only by every
//! request. Lookups go through canonical (PascalCase) model names.

use crate::config::ConfigError;
use crate::error::{Result, TranslateError};
use crate::naming::to_pascal_join_name;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    BelongsTo,
    HasMany,
    HasOne,
}

impl RelationKind {
    /// Whether joining along this relation can repeat rows of the parent.
    pub fn fans_out(self) -> bool {
        matches!(self, Self::HasMany)
    }
}

/// An association from one model to another.
///
/// The join condition is `source.source_key = target.target_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Name the association is included under, e.g. `Customer` or `Orders:billing`.
    pub alias: String,
    /// Canonical name of the target model.
    pub target: String,
    pub kind: RelationKind,
    pub source_key: String,
    pub target_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelHandle {
    /// Canonical model name, e.g. `OrderItems`.
    pub name: String,
    /// Storage table name, e.g. `order_items`.
    pub table: String,
    #[serde(default)]
    pub primary_key: Option<String>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

impl ModelHandle {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: None,
            relations: Vec::new(),
        }
    }

    pub fn with_primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = Some(key.into());
        self
    }

    pub fn with_relation(
        mut self,
        alias: impl Into<String>,
        target: impl Into<String>,
        kind: RelationKind,
        source_key: impl Into<String>,
        target_key: impl Into<String>,
    ) -> Self {
        self.relations.push(Relation {
            alias: alias.into(),
            target: target.into(),
            kind,
            source_key: source_key.into(),
            target_key: target_key.into(),
        });
        self
    }

    pub fn relation(&self, alias: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.alias == alias)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, ModelHandle>,
}

impl ModelRegistry {
    /// Validates and indexes the given models.
    pub fn from_models(models: Vec<ModelHandle>) -> std::result::Result<Self, ConfigError> {
        let mut index = HashMap::with_capacity(models.len());
        for model in models {
            if index.contains_key(&model.name) {
                return Err(ConfigError::DuplicateModel(model.name));
            }
            index.insert(model.name.clone(), model);
        }

        for model in index.values() {
            for relation in &model.relations {
                if !index.contains_key(&relation.target) {
                    return Err(ConfigError::UnknownRelationTarget {
                        model: model.name.clone(),
                        alias: relation.alias.clone(),
                        target: relation.target.clone(),
                    });
                }
            }
        }

        Ok(Self { models: index })
    }

    pub fn get(&self, name: &str) -> Option<&ModelHandle> {
        self.models.get(name)
    }

    /// Looks up the model named by a route segment such as `order_items`.
    pub fn model_for_route(&self, route: &str) -> Result<&ModelHandle> {
        let name = to_pascal_join_name(route);
        self.models
            .get(&name)
            .ok_or(TranslateError::ModelNotFound(name))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Customers 1-n Orders 1-n LineItems n-1 Products, with a second
    /// `Orders:billing` association on Customers.
    pub(crate) fn shop_registry() -> ModelRegistry {
        ModelRegistry::from_models(vec![
            ModelHandle::new("Customers", "customers")
                .with_primary_key("id")
                .with_relation("Orders", "Orders", RelationKind::HasMany, "id", "customer_id")
                .with_relation(
                    "Orders:billing",
                    "Orders",
                    RelationKind::HasMany,
                    "id",
                    "billing_customer_id",
                ),
            ModelHandle::new("Orders", "orders")
                .with_primary_key("id")
                .with_relation("Customers", "Customers", RelationKind::BelongsTo, "customer_id", "id")
                .with_relation("LineItems", "LineItems", RelationKind::HasMany, "id", "order_id"),
            ModelHandle::new("LineItems", "line_items")
                .with_primary_key("id")
                .with_relation("Products", "Products", RelationKind::BelongsTo, "product_id", "id"),
            ModelHandle::new("Products", "products").with_primary_key("id"),
        ])
        .expect("valid shop registry")
    }

    #[test]
    fn test_model_for_route() {
        let registry = shop_registry();
        assert_eq!(registry.model_for_route("line_items").unwrap().table, "line_items");
        assert_eq!(registry.model_for_route("orders").unwrap().name, "Orders");
        assert_eq!(
            registry.model_for_route("invoices"),
            Err(TranslateError::ModelNotFound("Invoices".to_string()))
        );
    }

    #[test]
    fn test_relation_lookup() {
        let registry = shop_registry();
        let customers = registry.get("Customers").unwrap();
        assert_eq!(customers.relation("Orders:billing").unwrap().target_key, "billing_customer_id");
        assert!(customers.relation("Products").is_none());
    }

    #[test]
    fn test_relation_kind_fan_out() {
        assert!(RelationKind::HasMany.fans_out());
        assert!(!RelationKind::HasOne.fans_out());
        assert!(!RelationKind::BelongsTo.fans_out());
    }

    #[test]
    fn test_duplicate_model_rejected() {
        let result = ModelRegistry::from_models(vec![
            ModelHandle::new("Orders", "orders"),
            ModelHandle::new("Orders", "orders_v2"),
        ]);
        assert!(matches!(result, Err(ConfigError::DuplicateModel(name)) if name == "Orders"));
    }

    #[test]
    fn test_unknown_relation_target_rejected() {
        let result = ModelRegistry::from_models(vec![ModelHandle::new("Orders", "orders")
            .with_relation("Coupons", "Coupons", RelationKind::HasMany, "id", "order_id")]);
        assert!(matches!(result, Err(ConfigError::UnknownRelationTarget { .. })));
    }
}
