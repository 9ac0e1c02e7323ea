//! sanctions - 人事向けのバッチ処理 CLI
//!
//! GUI の代わりの薄いシェル。設定を読み、本番用の ports をつないでエンジンを呼ぶ。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use sanctions_core::app::{CancelHandle, EngineBuilder, HistoryService};
use sanctions_core::config::AppConfig;
use sanctions_core::domain::{Category, NewSanction, OperatorId, ProcessingSummary, WorkItem};
use sanctions_core::impls::{PostgrestStore, SqliteLedger};
use sanctions_core::observability::init_tracing;
use sanctions_core::ports::{Clock, Ledger, RemoteStore, SystemClock};

#[derive(Debug, Parser)]
#[command(name = "sanctions", version, about = "Procesamiento masivo de sanciones para RRHH")]
struct Cli {
    /// YAML の設定ファイル
    #[arg(long, global = true, env = "SANCTIONS_CONFIG")]
    config: Option<PathBuf>,

    /// 処理者名（コメントと台帳に残る）
    #[arg(long, global = true, env = "SANCTIONS_OPERATOR")]
    operator: Option<String>,

    /// 結果を JSON で出力
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// リモートストアへの疎通確認
    Ping,
    /// 未処理の承認済みサンクション一覧
    Pending {
        /// faltas / horas / resto
        #[arg(long)]
        category: Option<String>,
    },
    /// 未処理分をまとめて処理済みにする
    Process {
        #[arg(long)]
        category: Option<String>,
        /// 先頭 N 件だけ
        #[arg(long)]
        limit: Option<usize>,
    },
    /// 処理済み履歴（台帳の情報つき）
    History {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// 台帳の統計
    Stats,
    /// テスト用のサンクションを 1 件作る
    Seed,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env が無くてもよい
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = load_config(cli.config.as_deref())?;
    info!(?config, "configuration ready");

    match &cli.command {
        Command::Ping => ping(&config).await,
        Command::Pending { category } => pending(&config, category.as_deref(), cli.json).await,
        Command::Process { category, limit } => {
            let operator = resolve_operator(&cli, &config)?;
            process(&config, operator, category.as_deref(), *limit, cli.json).await
        }
        Command::History { limit } => history(&config, *limit, cli.json).await,
        Command::Stats => stats(&config, cli.json).await,
        Command::Seed => seed(&config).await,
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<AppConfig> {
    let mut config = match path {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

fn resolve_operator(cli: &Cli, config: &AppConfig) -> Result<OperatorId> {
    let name = cli
        .operator
        .clone()
        .or_else(|| config.operator.clone())
        .unwrap_or_default();
    let operator = OperatorId::new(name.trim());
    if operator.is_blank() {
        bail!("operator is required: pass --operator or set SANCTIONS_OPERATOR");
    }
    Ok(operator)
}

fn remote_store(config: &AppConfig) -> Result<Arc<dyn RemoteStore>> {
    config.validate_remote()?;
    let store = PostgrestStore::from_config(&config.remote).context("building remote store client")?;
    Ok(Arc::new(store))
}

fn ledger(config: &AppConfig) -> Result<Arc<dyn Ledger>> {
    let ledger = SqliteLedger::open(&config.ledger.path)
        .with_context(|| format!("opening ledger at {}", config.ledger.path.display()))?;
    Ok(Arc::new(ledger))
}

fn parse_category(raw: Option<&str>) -> Result<Option<Category>> {
    raw.map(|raw| {
        Category::parse(raw).with_context(|| format!("unknown category {raw:?} (faltas, horas, resto)"))
    })
    .transpose()
}

fn filter_category(items: Vec<WorkItem>, category: Option<Category>) -> Vec<WorkItem> {
    match category {
        Some(category) => items.into_iter().filter(|i| i.category() == category).collect(),
        None => items,
    }
}

async fn ping(config: &AppConfig) -> Result<()> {
    remote_store(config)?.ping().await.context("remote store unreachable")?;
    println!("✅ Conexión correcta");
    Ok(())
}

async fn pending(config: &AppConfig, category: Option<&str>, json: bool) -> Result<()> {
    let category = parse_category(category)?;
    let items = filter_category(remote_store(config)?.fetch_pending().await?, category);

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }
    for (category, items) in sanctions_core::domain::categorize(items) {
        println!("== {} ({}) ==", category.label(), items.len());
        for item in items {
            println!(
                "  {}  {:<10}  {:<8}  {:<30}  {}",
                item.id.short(),
                item.date.as_deref().unwrap_or("-"),
                item.employee_code.map(|c| c.to_string()).unwrap_or_default(),
                item.employee_name.as_deref().unwrap_or("-"),
                item.sanction_type.as_deref().unwrap_or("-"),
            );
        }
    }
    Ok(())
}

async fn process(
    config: &AppConfig,
    operator: OperatorId,
    category: Option<&str>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let category = parse_category(category)?;
    let store = remote_store(config)?;
    let engine = EngineBuilder::new()
        .remote_store(Arc::clone(&store))
        .ledger(ledger(config)?)
        .settings(config.engine_settings())
        .build()?;

    let mut items = filter_category(store.fetch_pending().await?, category);
    if let Some(limit) = limit {
        items.truncate(limit);
    }
    if items.is_empty() {
        println!("No hay sanciones pendientes para procesar");
        return Ok(());
    }

    let (cancel, signal) = CancelHandle::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing in-flight batches");
            cancel.request();
        }
    });

    let progress = |message: &str| println!("  {message}");
    let summary = engine
        .process(&mut items, &operator, Arc::new(progress), signal)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &ProcessingSummary) {
    println!();
    println!("Procesamiento completado en {:.2}s", summary.elapsed.as_secs_f64());
    println!("  Exitosas:        {}", summary.succeeded);
    println!("  Fallidas:        {}", summary.failed);
    println!("  Ya procesadas:   {}", summary.already_claimed);
    if summary.not_dispatched > 0 {
        println!("  Sin procesar:    {} (cancelado)", summary.not_dispatched);
    }
    if summary.validation_degraded {
        println!("⚠️  No se pudo verificar la disponibilidad; puede haber duplicados");
    }
    if !summary.errors.is_empty() {
        println!("Errores:");
        for line in &summary.errors {
            println!("  - {line}");
        }
        let hidden = summary.failures.len().saturating_sub(summary.errors.len());
        if hidden > 0 {
            println!("  ... y {hidden} más");
        }
    }
}

async fn history(config: &AppConfig, limit: Option<usize>, json: bool) -> Result<()> {
    let service = HistoryService::new(remote_store(config)?, ledger(config)?);
    let records = service
        .recent(limit.unwrap_or(config.processing.history_limit))
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    for record in records {
        println!(
            "  {}  {:<20}  {:<12}  {:<8}  {}",
            record.item.id.short(),
            record.processed_at.as_deref().unwrap_or("-"),
            record.processed_by.as_deref().unwrap_or("-"),
            record
                .elapsed_secs
                .map(|s| format!("{s:.2}s"))
                .unwrap_or_default(),
            record.item.sanction_type.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

async fn stats(config: &AppConfig, json: bool) -> Result<()> {
    let stats = ledger(config)?.stats(SystemClock.now().date_naive()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!("Total procesadas: {}", stats.total_processed);
    println!("Procesadas hoy:   {}", stats.processed_today);
    println!(
        "Tiempo (s):       prom {:.2} / min {:.2} / max {:.2}",
        stats.avg_elapsed_secs, stats.min_elapsed_secs, stats.max_elapsed_secs
    );
    println!("Por usuario:");
    for (operator, count) in &stats.by_operator {
        println!("  {operator:<20} {count}");
    }
    println!("Por tipo:");
    for (ty, count) in &stats.by_type {
        println!("  {ty:<20} {count}");
    }
    Ok(())
}

async fn seed(config: &AppConfig) -> Result<()> {
    let now = SystemClock.now();
    let record = NewSanction::test_record(
        now.date_naive(),
        &now.format("%Y-%m-%d %H:%M:%S").to_string(),
    );
    remote_store(config)?.insert_item(&record).await?;
    println!("✅ Sanción de prueba creada ({})", record.employee_name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_process_flags() {
        let cli = Cli::try_parse_from([
            "sanctions",
            "--operator",
            "maria",
            "process",
            "--category",
            "faltas",
            "--limit",
            "3",
        ])
        .unwrap();
        assert_eq!(cli.operator.as_deref(), Some("maria"));
        assert!(matches!(
            cli.command,
            Command::Process { limit: Some(3), .. }
        ));
    }

    #[test]
    fn unknown_category_is_an_error() {
        assert!(parse_category(Some("vacaciones")).is_err());
        assert_eq!(
            parse_category(Some("faltas")).unwrap(),
            Some(Category::AbsencesAndLeave)
        );
        assert_eq!(parse_category(None).unwrap(), None);
    }

    #[test]
    fn blank_operator_is_refused() {
        let cli = Cli::try_parse_from(["sanctions", "--operator", "  ", "process"]).unwrap();
        assert!(resolve_operator(&cli, &AppConfig::default()).is_err());
    }
}
