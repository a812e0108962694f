//! 命令行入口：读取请求行，生成查询计划和SQL
//!
//! ```text
//! >> GET /customers?where=[orders.total,gt,100]&order=name,ASC&limit=5
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use universal_query::access::Method;
use universal_query::config::{ConfigError, Dialect, ServiceConfig};
use universal_query::sql_compiler::SqlCompiler;
use universal_query::{QueryParams, Translator};

/// Query parameter to SQL translator.
#[derive(Parser)]
#[command(name = "universal-query")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Service configuration (models, relations, enabled tables).
    #[arg(short, long, env = "UNIVERSAL_QUERY_CONFIG", default_value = "service_config.json")]
    config: PathBuf,

    /// SQL dialect; overrides the configured one.
    #[arg(short, long, value_enum)]
    dialect: Option<Dialect>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    /// Translate a single request line and exit instead of starting the REPL.
    request: Option<String>,
}

/// 一条请求：方法、路由和原始查询字符串
#[derive(Debug, PartialEq)]
struct RequestLine<'a> {
    method: Method,
    route: &'a str,
    query: &'a str,
}

/// 解析 `GET /orders?where=...`，方法省略时按 GET 处理
fn parse_request_line(line: &str) -> anyhow::Result<RequestLine<'_>> {
    let line = line.trim();
    let (method, target) = match line.split_once(char::is_whitespace) {
        Some((method, target)) => {
            let method: Method = method.parse().with_context(|| format!("不支持的HTTP方法: {method}"))?;
            (method, target.trim())
        }
        None => (Method::Get, line),
    };

    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    let route = path
        .trim_matches('/')
        .rsplit('/')
        .next()
        .filter(|route| !route.is_empty())
        .ok_or_else(|| anyhow!("请求缺少路由: {line}"))?;

    Ok(RequestLine { method, route, query })
}

struct Session {
    translator: Translator,
    compiler: SqlCompiler,
}

impl Session {
    fn handle(&self, line: &str) -> anyhow::Result<()> {
        let request = parse_request_line(line)?;
        self.translator.authorize(request.method, request.route)?;

        let params = QueryParams::from_query_string(request.query);
        let translation = self.translator.translate(request.route, &params)?;

        println!("\n[查询计划]:");
        println!("{}", serde_json::to_string_pretty(&translation.plan)?);

        let compiled = self.compiler.compile(&translation.plan)?;
        println!("\n[生成的 SQL]:");
        println!("{}", compiled.query.display_sql);

        if let Some(count) = &compiled.count {
            println!("\n[计数 SQL]:");
            println!("{}", count.display_sql);
        }
        for opt in &compiled.optimizations {
            println!("• {:?}", opt);
        }
        if let Some(pagination) = translation.deferred_pagination() {
            println!(
                "\n[分页]: 过滤条件涉及关联表，limit={:?} offset={:?} 需在结果集上执行",
                pagination.limit, pagination.offset
            );
        }
        Ok(())
    }
}

/// 加载服务配置，文件不存在时使用默认配置
fn load_config(path: &Path) -> anyhow::Result<ServiceConfig> {
    match ServiceConfig::from_json_file(path) {
        Ok(config) => {
            info!(path = %path.display(), models = config.models.len(), "loaded service config");
            Ok(config)
        }
        Err(ConfigError::NotFound(_)) => {
            warn!(path = %path.display(), "config file not found, using default config");
            Ok(ServiceConfig::default())
        }
        Err(e) => Err(e).context("failed to load service config"),
    }
}

fn repl(session: &Session) -> anyhow::Result<()> {
    let mut editor = DefaultEditor::new()?;
    println!("--- Universal Query: 请求参数到查询计划/SQL ---");
    println!("输入请求行，例如 GET /customers?where=[status,eq,active]&limit=5 ，Ctrl-D 退出");

    loop {
        match editor.readline(">> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line.as_str());
                if let Err(e) = session.handle(&line) {
                    println!("✗ {e:#}");
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&cli.config)?;
    let dialect = cli.dialect.unwrap_or(config.dialect);
    let translator = Translator::from_config(&config)?;
    let compiler = SqlCompiler::new(Arc::new(config.registry()?), dialect);
    let session = Session { translator, compiler };

    match cli.request {
        Some(line) => session.handle(&line),
        None => repl(&session),
    }
}
