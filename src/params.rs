//! Raw query parameters of a request to the generic endpoint.

use std::collections::HashMap;
use url::form_urlencoded;

/// Percent-decoded query parameters. Every field is the raw text the caller
/// sent; the translator does all parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pub include: Option<String>,
    pub filter: Option<String>,
    pub attributes: Option<String>,
    pub aggregate: Option<String>,
    pub order: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub count: Option<String>,
    pub raw: Option<String>,
}

impl QueryParams {
    /// Decodes `where=%5Bstatus%2Ceq%2Copen%5D&limit=5`. Unknown keys are
    /// ignored; a repeated key keeps its last value.
    pub fn from_query_string(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self::from_pairs(form_urlencoded::parse(query.as_bytes()).into_owned())
    }

    pub fn from_map(map: &HashMap<String, String>) -> Self {
        Self::from_pairs(map.iter().map(|(k, v)| (k.clone(), v.clone())))
    }

    fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "include" => &mut params.include,
                "where" => &mut params.filter,
                "attributes" => &mut params.attributes,
                "agregate" | "aggregate" => &mut params.aggregate,
                "order" => &mut params.order,
                "limit" => &mut params.limit,
                "offset" => &mut params.offset,
                "count" => &mut params.count,
                "raw" => &mut params.raw,
                _ => continue,
            };
            *slot = Some(value);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_decoding() {
        let params = QueryParams::from_query_string(
            "?where=%5Bname%2Clike%2C%25a%25%5D&order=name%2CASC&limit=20&offset=0",
        );
        assert_eq!(params.filter.as_deref(), Some("[name,like,%a%]"));
        assert_eq!(params.order.as_deref(), Some("name,ASC"));
        assert_eq!(params.limit.as_deref(), Some("20"));
        assert_eq!(params.offset.as_deref(), Some("0"));
        assert_eq!(params.include, None);
    }

    #[test]
    fn test_unencoded_brackets_and_aliases() {
        let params = QueryParams::from_query_string(
            "where=[status,eq,active]AND[orders.total,gt,100]&aggregate=amount,SUM,t,,0&raw=true&x=1",
        );
        assert_eq!(
            params.filter.as_deref(),
            Some("[status,eq,active]AND[orders.total,gt,100]")
        );
        assert_eq!(params.aggregate.as_deref(), Some("amount,SUM,t,,0"));
        assert_eq!(params.raw.as_deref(), Some("true"));
    }

    #[test]
    fn test_from_map() {
        let mut map = HashMap::new();
        map.insert("agregate".to_string(), "amount,SUM,t".to_string());
        map.insert("count".to_string(), "1".to_string());
        let params = QueryParams::from_map(&map);
        assert_eq!(params.aggregate.as_deref(), Some("amount,SUM,t"));
        assert_eq!(params.count.as_deref(), Some("1"));
    }
}
