//! 标识符命名转换
//!
//! 数据库表名和列名使用 snake_case，查询计划中的模型名使用 PascalCase。

/// `order_items` -> `orderItems`
///
/// 每个 `_x` 被替换为大写的 `X`，结尾的下划线原样保留。
pub fn snake_to_camel(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '_' {
            if let Some(next) = chars.next() {
                out.extend(next.to_uppercase());
                continue;
            }
        }
        out.push(c);
    }
    out
}

pub fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// 表名转换为关联/模型名：`order_items` -> `OrderItems`
pub fn to_pascal_join_name(s: &str) -> String {
    capitalize_first(&snake_to_camel(s))
}

/// 客户端字段名转换为存储列名：`createdAt` -> `created_at`
///
/// 只转换 camelCase（首字母小写且存在小写到大写的边界），其他输入原样返回。
pub fn to_column_case(s: &str) -> String {
    let starts_lower = s.chars().next().is_some_and(|c| c.is_ascii_lowercase());
    if !starts_lower {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len() + 4);
    let mut prev: Option<char> = None;
    for c in s.chars() {
        if c.is_ascii_uppercase() {
            if prev.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit()) {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
        prev = Some(c);
    }
    out
}
