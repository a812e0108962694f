//! `where` 参数的词法分析器
//!
//! 输入形如 `[status,eq,active]AND[orders.total,gt,100]OR[name,like,%a%]`，
//! 输出 `Clause` / `And` / `Or` token。方括号内的内容不再细分，交给语法分析器处理。

use crate::token::{Span, Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a str,
    /// 输入字符串中的当前位置（字节索引）
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input, position: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.position..]
    }

    /// 返回当前位置的字符，不推进位置
    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// 推进位置一个字符并返回该字符
    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    /// 跳过空白字符
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    /// 读取 `[...]` 子句，开始的 `[` 已经被调用者消费
    fn read_clause(&mut self, start: usize) -> Token<'a> {
        let body = self.rest();
        match body.find(']') {
            Some(end) => {
                let content = &body[..end];
                self.position += end + 1; // 消费结束的 ']'
                Token {
                    kind: TokenKind::Clause(content),
                    span: Span::new(start, self.position),
                }
            }
            None => self.illegal(start),
        }
    }

    /// 无法识别的输入：吞掉剩余全部内容，之后不再产生 token
    fn illegal(&mut self, start: usize) -> Token<'a> {
        let literal = &self.input[start..];
        self.position = self.input.len();
        Token {
            kind: TokenKind::Illegal(literal),
            span: Span::new(start, self.position),
        }
    }

    fn keyword(&mut self, start: usize, word: &str, kind: TokenKind<'a>) -> Token<'a> {
        self.position += word.len();
        Token {
            kind,
            span: Span::new(start, self.position),
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();
        let start = self.position;
        let rest = self.rest();

        if rest.is_empty() {
            return None; // 到达输入末尾
        }

        let token = if rest.starts_with('[') {
            self.bump();
            self.read_clause(start)
        } else if rest.starts_with("AND") {
            self.keyword(start, "AND", TokenKind::And)
        } else if rest.starts_with("OR") {
            self.keyword(start, "OR", TokenKind::Or)
        } else {
            self.illegal(start)
        };
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind<'_>> {
        Lexer::new(input).map(|t| t.kind).collect()
    }

    #[test]
    fn test_single_clause() {
        let mut lexer = Lexer::new("[status,eq,active]");
        let token = lexer.next().unwrap();
        assert_eq!(token.kind, TokenKind::Clause("status,eq,active"));
        assert_eq!(token.span, Span::new(0, 18));
        assert_eq!(lexer.next(), None);
    }

    #[test]
    fn test_connectives() {
        assert_eq!(
            kinds("[a,eq,1]AND[b,eq,2]OR[c,eq,3]"),
            vec![
                TokenKind::Clause("a,eq,1"),
                TokenKind::And,
                TokenKind::Clause("b,eq,2"),
                TokenKind::Or,
                TokenKind::Clause("c,eq,3"),
            ]
        );
    }

    #[test]
    fn test_whitespace_between_tokens() {
        assert_eq!(
            kinds("[a,eq,1] AND [b,eq,2 3]"),
            vec![
                TokenKind::Clause("a,eq,1"),
                TokenKind::And,
                TokenKind::Clause("b,eq,2 3"),
            ]
        );
    }

    #[test]
    fn test_values_keep_dots_and_percent() {
        assert_eq!(
            kinds("[orders.total,gt,10.5]OR[name,like,%a%]"),
            vec![
                TokenKind::Clause("orders.total,gt,10.5"),
                TokenKind::Or,
                TokenKind::Clause("name,like,%a%"),
            ]
        );
    }

    #[test]
    fn test_unknown_connective_is_illegal() {
        assert_eq!(
            kinds("[a,eq,1]XOR[b,eq,2]"),
            vec![TokenKind::Clause("a,eq,1"), TokenKind::Illegal("XOR[b,eq,2]")]
        );
    }

    #[test]
    fn test_lowercase_connective_is_illegal() {
        assert_eq!(
            kinds("[a,eq,1]and[b,eq,2]"),
            vec![TokenKind::Clause("a,eq,1"), TokenKind::Illegal("and[b,eq,2]")]
        );
    }

    #[test]
    fn test_unterminated_clause() {
        let tokens: Vec<_> = Lexer::new("[a,eq,1]AND[b,eq").collect();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[2].kind, TokenKind::Illegal("[b,eq"));
        assert_eq!(tokens[2].span, Span::new(11, 16));
    }
}
