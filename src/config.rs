//! 配置模块，负责加载JSON服务配置（模型注册表、表访问白名单、SQL方言）

use crate::access::{AccessPolicy, EnabledTables};
use crate::registry::{ModelHandle, ModelRegistry, RelationKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置文件不存在: {}", .0.display())]
    NotFound(PathBuf),

    #[error("无法读取配置文件 {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("无法解析JSON配置文件 {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("模型重复定义: {0}")]
    DuplicateModel(String),

    #[error("模型 {model} 的关联 {alias} 指向未知模型 {target}")]
    UnknownRelationTarget {
        model: String,
        alias: String,
        target: String,
    },
}

/// 生成SQL时使用的数据库方言
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
    Mysql,
    Sqlite,
}

/// 服务配置结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub dialect: Dialect,
    /// 为 true 时 where 语法错误直接报错，否则忽略过滤条件
    #[serde(default)]
    pub strict_filters: bool,
    /// 各HTTP方法允许访问的表
    #[serde(default)]
    pub enabled_tables: EnabledTables,
    pub models: Vec<ModelHandle>,
}

impl ServiceConfig {
    /// 从JSON文件加载服务配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(ConfigError::NotFound(path_ref.to_path_buf()));
        }

        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path_ref.to_path_buf(),
            source,
        })
    }

    /// 校验模型定义并构建注册表
    pub fn registry(&self) -> Result<ModelRegistry, ConfigError> {
        ModelRegistry::from_models(self.models.clone())
    }

    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy::from(&self.enabled_tables)
    }

    /// 默认配置（用于演示或fallback）：客户、订单、订单明细、商品
    pub fn default() -> Self {
        let models = vec![
            ModelHandle::new("Customers", "customers")
                .with_primary_key("id")
                .with_relation("Orders", "Orders", RelationKind::HasMany, "id", "customer_id"),
            ModelHandle::new("Orders", "orders")
                .with_primary_key("id")
                .with_relation("Customers", "Customers", RelationKind::BelongsTo, "customer_id", "id")
                .with_relation("LineItems", "LineItems", RelationKind::HasMany, "id", "order_id"),
            ModelHandle::new("LineItems", "line_items")
                .with_primary_key("id")
                .with_relation("Products", "Products", RelationKind::BelongsTo, "product_id", "id"),
            ModelHandle::new("Products", "products").with_primary_key("id"),
        ];

        let tables = ["customers", "orders", "line_items", "products"]
            .iter()
            .map(|t| t.to_string())
            .collect();

        Self {
            dialect: Dialect::Postgres,
            strict_filters: false,
            enabled_tables: EnabledTables {
                get: tables,
                ..Default::default()
            },
            models,
        }
    }
}
