//! Translates the query parameters of a generic REST endpoint
//! (`where`, `attributes`, `agregate`, `order`, `include`, `limit`, ...) into an
//! engine-agnostic [`plan::QueryPlan`], and renders plans into SQL.

pub mod access;
pub mod aggregate;
pub mod attributes;
pub mod config;
pub mod error;
pub mod lexer;
pub mod naming;
pub mod order;
pub mod params;
pub mod parser;
pub mod path;
pub mod plan;
pub mod registry;
pub mod sql_compiler;
pub mod token;
pub mod translator;

pub use error::{Result, TranslateError};
pub use params::QueryParams;
pub use plan::QueryPlan;
pub use translator::{Pagination, Translation, Translator};
