//! `where` 参数的语法分析器
//!
//! ## 解析流程
//!
//! ```text
//! parse_where()
//!   ├─ Lexer: "[a,eq,1]AND[b.c,gt,2]OR[d,in,1,2]"
//!   │          → Clause("a,eq,1") And Clause("b.c,gt,2") Or Clause("d,in,1,2")
//!   ├─ Parser::parse() → Vec<ConditionClause>
//!   │    ├─ 第一个子句没有连接词，按 AND 处理
//!   │    ├─ 两个子句之间没有连接词，同样按 AND 处理
//!   │    └─ parse_clause(): 按 ',' 切分 → 路径.列名, 运算符, 值...
//!   ├─ 所有非空路径交给 path::resolve_segments()，保证 join 节点先存在
//!   └─ FilterTree::fold() → OR 连接的 AND 分组
//! ```
//!
//! ## 语法
//!
//! ```text
//! where      := clause (connective? clause)*
//! clause     := '[' pathcol ',' operator ',' value (',' value)* ']'
//! connective := 'AND' | 'OR'
//! pathcol    := (segment '.')* column
//! ```
//!
//! 单个值 `null`（不区分大小写）表示空值；两个及以上的值用于 `between`、`in` 等运算符。

use crate::error::{Result, TranslateError};
use crate::lexer::Lexer;
use crate::naming::to_column_case;
use crate::path::{resolve_segments, split_path_column};
use crate::plan::{
    Condition, ConditionClause, Connective, FilterTree, FilterValue, IncludeTree, NodeId,
};
use crate::registry::ModelRegistry;
use crate::token::{Span, Token, TokenKind};
use tracing::debug;

pub struct Parser<'a> {
    tokens: &'a [Token<'a>],
    position: usize,
}

fn malformed(span: Span, message: impl Into<String>) -> TranslateError {
    TranslateError::MalformedFilter {
        position: span.start,
        message: message.into(),
    }
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token<'a>]) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    /// 返回当前 token 并推进位置
    fn advance(&mut self) -> Option<&'a Token<'a>> {
        let token = self.tokens.get(self.position)?;
        self.position += 1;
        Some(token)
    }

    pub fn parse(&mut self) -> Result<Vec<ConditionClause>> {
        let mut clauses = Vec::new();
        let mut pending: Option<(Connective, Span)> = None;

        while let Some(token) = self.advance() {
            match &token.kind {
                TokenKind::And | TokenKind::Or => {
                    if pending.is_some() {
                        return Err(malformed(token.span, "expected a clause after the connective"));
                    }
                    let connective = if token.kind == TokenKind::And {
                        Connective::And
                    } else {
                        Connective::Or
                    };
                    pending = Some((connective, token.span));
                }
                TokenKind::Clause(body) => {
                    let connective = pending.take().map_or(Connective::And, |(c, _)| c);
                    clauses.push(parse_clause(body, connective, token.span)?);
                }
                TokenKind::Illegal(literal) => {
                    let message = if literal.starts_with('[') {
                        "clause is missing its closing ']'".to_string()
                    } else {
                        format!("unrecognized connective '{literal}'")
                    };
                    return Err(malformed(token.span, message));
                }
            }
        }

        if let Some((_, span)) = pending {
            return Err(malformed(span, "dangling connective at end of input"));
        }

        Ok(clauses)
    }
}

/// 解析方括号内的内容：`path.column,operator,value(,value)*`
fn parse_clause(body: &str, connective: Connective, span: Span) -> Result<ConditionClause> {
    let parts: Vec<&str> = body.split(',').collect();
    if parts.len() < 3 {
        return Err(malformed(
            span,
            format!("clause '[{body}]' needs a column, an operator and a value"),
        ));
    }

    let (path, column) = split_path_column(parts[0]);
    if column.is_empty() {
        return Err(malformed(span, format!("clause '[{body}]' has no column")));
    }

    let operator = parts[1].trim();
    if operator.is_empty() {
        return Err(malformed(span, format!("clause '[{body}]' has no operator")));
    }

    let value = match &parts[2..] {
        [single] if single.eq_ignore_ascii_case("null") => FilterValue::Null,
        [single] => FilterValue::One(single.to_string()),
        many => FilterValue::Many(many.iter().map(|v| v.to_string()).collect()),
    };

    Ok(ConditionClause {
        path,
        column: to_column_case(&column),
        operator: operator.to_string(),
        value,
        connective,
    })
}

/// The folded filter and whether any clause reached into a joined table.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFilter {
    pub tree: FilterTree,
    pub has_nested_filter: bool,
}

/// Parses a `where` string, creating the joins its clauses reference.
pub fn parse_where(
    input: &str,
    include: &mut IncludeTree,
    registry: &ModelRegistry,
) -> Result<ParsedFilter> {
    let tokens: Vec<_> = Lexer::new(input).collect();
    let clauses = Parser::new(&tokens).parse()?;
    debug!(clauses = clauses.len(), "parsed where clauses");

    let conditions = clauses
        .into_iter()
        .map(|clause| {
            let path = if clause.path.is_empty() {
                Vec::new()
            } else {
                let node = resolve_segments(include, NodeId::ROOT, &clause.path, registry)?;
                include.alias_chain(node)
            };
            Ok((
                clause.connective,
                Condition {
                    path,
                    column: clause.column,
                    operator: clause.operator,
                    value: clause.value,
                },
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    let has_nested_filter = conditions.iter().any(|(_, c)| !c.path.is_empty());

    Ok(ParsedFilter {
        tree: FilterTree::fold(conditions),
        has_nested_filter,
    })
}
