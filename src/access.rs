//! Per-method allow-lists of tables exposed through the generic endpoint.

use crate::error::{Result, TranslateError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// HTTP methods the endpoint distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl std::str::FromStr for Method {
    type Err = TranslateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            _ => Err(TranslateError::invalid("method", s, "expected GET, POST, PATCH or DELETE")),
        }
    }
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Serialized form of the allow-lists, keyed by lowercase method name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnabledTables {
    #[serde(default)]
    pub get: Vec<String>,
    #[serde(default)]
    pub post: Vec<String>,
    #[serde(default)]
    pub patch: Vec<String>,
    #[serde(default)]
    pub delete: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    get: HashSet<String>,
    post: HashSet<String>,
    patch: HashSet<String>,
    delete: HashSet<String>,
}

impl AccessPolicy {
    fn tables(&self, method: Method) -> &HashSet<String> {
        match method {
            Method::Get => &self.get,
            Method::Post => &self.post,
            Method::Patch => &self.patch,
            Method::Delete => &self.delete,
        }
    }

    pub fn is_enabled(&self, method: Method, table: &str) -> bool {
        self.tables(method).contains(table)
    }

    pub fn check(&self, method: Method, table: &str) -> Result<()> {
        if self.is_enabled(method, table) {
            Ok(())
        } else {
            Err(TranslateError::Forbidden {
                method: method.to_string(),
                table: table.to_string(),
            })
        }
    }
}

impl From<&EnabledTables> for AccessPolicy {
    fn from(tables: &EnabledTables) -> Self {
        let set = |v: &Vec<String>| v.iter().cloned().collect::<HashSet<_>>();
        Self {
            get: set(&tables.get),
            post: set(&tables.post),
            patch: set(&tables.patch),
            delete: set(&tables.delete),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing() {
        assert_eq!("get".parse::<Method>(), Ok(Method::Get));
        assert_eq!("DELETE".parse::<Method>(), Ok(Method::Delete));
        assert_eq!(
            "PUT".parse::<Method>(),
            Err(TranslateError::InvalidParameter {
                name: "method".to_string(),
                value: "PUT".to_string(),
                reason: "expected GET, POST, PATCH or DELETE".to_string(),
            })
        );
    }

    #[test]
    fn test_each_method_uses_its_own_list() {
        let policy = AccessPolicy::from(&EnabledTables {
            get: vec!["orders".to_string()],
            patch: vec!["orders".to_string()],
            ..Default::default()
        });

        assert!(policy.check(Method::Get, "orders").is_ok());
        assert!(policy.check(Method::Patch, "orders").is_ok());
        assert_eq!(
            policy.check(Method::Delete, "orders"),
            Err(TranslateError::Forbidden {
                method: "DELETE".to_string(),
                table: "orders".to_string(),
            })
        );
        assert!(policy.check(Method::Get, "customers").is_err());
    }
}
