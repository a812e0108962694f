use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::sync::Arc;
use universal_query::access::AccessPolicy;
use universal_query::config::{Dialect, ServiceConfig};
use universal_query::lexer::Lexer;
use universal_query::parser::Parser;
use universal_query::sql_compiler::SqlCompiler;
use universal_query::{QueryParams, Translator};

const WHERE_CASES: [(&str, &str); 3] = [
    ("simple", "[status,eq,active]"),
    ("medium", "[status,eq,active]AND[total,gt,100]OR[name,like,%a%]"),
    (
        "complex",
        "[status,in,a,b,c]AND[orders.total,between,10,20]OR[orders.line_items.qty,gt,1]AND[orders.line_items.products.sku,eq,X-1]OR[deleted_at,eq,null]",
    ),
];

const REQUEST_CASES: [(&str, &str); 3] = [
    ("filter_only", "where=[status,eq,active]&limit=20"),
    (
        "nested_filter",
        "where=[orders.total,gt,100]OR[orders.line_items.qty,gt,1]&order=name,ASC&limit=20&offset=40",
    ),
    (
        "full",
        "include=orders.line_items&where=[status,eq,active]AND[orders.total,gt,100]&attributes=,id,name;orders,total\
         &agregate=orders.total,SUM,spent,id,1&order=orders.created_at,DESC;name,ASC&count=true",
    ),
];

// 创建一个翻译器实例，使用默认配置
fn create_translator() -> Translator {
    let config = ServiceConfig::default();
    let registry = Arc::new(config.registry().expect("默认配置应该有效"));
    Translator::new(registry, Arc::new(AccessPolicy::default()))
}

// 基准测试：词法分析性能
fn benchmark_lexer(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexer_performance");

    for (name, input) in WHERE_CASES {
        group.bench_with_input(BenchmarkId::new("tokenize", name), &input, |b, &input| {
            b.iter(|| {
                let tokens: Vec<_> = Lexer::new(black_box(input)).collect();
                black_box(tokens)
            })
        });
    }

    group.finish();
}

// 基准测试：语法分析性能
fn benchmark_parser(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_performance");

    for (name, input) in WHERE_CASES {
        // 预先词法分析
        let tokens: Vec<_> = Lexer::new(input).collect();

        group.bench_with_input(BenchmarkId::new("parse", name), &tokens, |b, tokens| {
            b.iter(|| {
                let mut parser = Parser::new(black_box(tokens));
                black_box(parser.parse().expect("解析应该成功"))
            })
        });
    }

    group.finish();
}

// 基准测试：完整的参数翻译
fn benchmark_translate(c: &mut Criterion) {
    let translator = create_translator();
    let mut group = c.benchmark_group("translate_performance");

    for (name, query) in REQUEST_CASES {
        let params = QueryParams::from_query_string(query);
        group.bench_with_input(BenchmarkId::new("translate", name), &params, |b, params| {
            b.iter(|| black_box(translator.translate("customers", black_box(params)).expect("翻译应该成功")))
        });
    }

    group.finish();
}

// 基准测试：SQL编译性能
fn benchmark_sql_compiler(c: &mut Criterion) {
    let translator = create_translator();
    let compiler = SqlCompiler::new(Arc::new(ServiceConfig::default().registry().expect("默认配置应该有效")), Dialect::Postgres);
    let mut group = c.benchmark_group("sql_compiler_performance");

    for (name, query) in REQUEST_CASES {
        let plan = translator
            .translate("customers", &QueryParams::from_query_string(query))
            .expect("翻译应该成功")
            .plan;

        group.bench_with_input(BenchmarkId::new("compile", name), &plan, |b, plan| {
            b.iter(|| black_box(compiler.compile(black_box(plan)).expect("编译应该成功")))
        });
    }

    group.finish();
}

// 基准测试：完整的端到端处理
fn benchmark_end_to_end(c: &mut Criterion) {
    let translator = create_translator();
    let compiler = SqlCompiler::new(Arc::new(ServiceConfig::default().registry().expect("默认配置应该有效")), Dialect::Postgres);
    let mut group = c.benchmark_group("end_to_end_performance");

    for (name, query) in REQUEST_CASES {
        group.bench_with_input(BenchmarkId::new("full_pipeline", name), &query, |b, &query| {
            b.iter(|| {
                let params = QueryParams::from_query_string(black_box(query));
                let translation = translator.translate("customers", &params).expect("翻译应该成功");
                black_box(compiler.compile(&translation.plan).expect("编译应该成功"))
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_lexer,
    benchmark_parser,
    benchmark_translate,
    benchmark_sql_compiler,
    benchmark_end_to_end
);
criterion_main!(benches);
