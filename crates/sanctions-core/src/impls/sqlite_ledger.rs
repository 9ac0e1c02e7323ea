//! SqliteLedger - 組み込み SQLite の監査台帳
//!
//! # 学習ポイント
//! - `std::sync::Mutex<Connection>` で書き込みを 1 本に直列化
//! - rusqlite は同期 API なので `spawn_blocking` に逃がす
//! - 既存の台帳ファイル（同じテーブル名・列名）をそのまま読めるようにする
//!
//! # タイムスタンプ
//! 自前の行はオフセットつき RFC 3339（ローカル時刻）で書く。古いファイルの
//! `DEFAULT CURRENT_TIMESTAMP` で入った行はオフセット無しの UTC なので、
//! 読むときに UTC として解釈してローカル時刻に直す。

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use rusqlite::{Connection, params, params_from_iter};
use tracing::{debug, info};

use crate::domain::ledger::round2;
use crate::domain::{LedgerEntry, LedgerError, LedgerStats, OperatorId, RunRecord, SanctionId};
use crate::ports::Ledger;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS procesadas (
    id TEXT PRIMARY KEY,
    fecha_proceso DATE DEFAULT CURRENT_TIMESTAMP,
    usuario TEXT,
    empleado_cod INTEGER,
    empleado_nombre TEXT,
    tipo_sancion TEXT
);
CREATE TABLE IF NOT EXISTS log_operaciones (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fecha DATETIME DEFAULT CURRENT_TIMESTAMP,
    usuario TEXT,
    operacion TEXT,
    detalle TEXT,
    resultado TEXT
);
CREATE INDEX IF NOT EXISTS idx_procesadas_fecha ON procesadas(fecha_proceso);
CREATE INDEX IF NOT EXISTS idx_procesadas_usuario ON procesadas(usuario);
CREATE INDEX IF NOT EXISTS idx_log_fecha ON log_operaciones(fecha);
";

/// 後から追加された列。古いファイルには無いことがある
const LATE_COLUMNS: [(&str, &str); 2] = [
    ("fecha_original", "DATE"),
    ("tiempo_procesamiento", "REAL"),
];

/// SQLite の `CURRENT_TIMESTAMP`（UTC）
const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// SQLite の変数上限（999）より十分小さく
const LOOKUP_CHUNK: usize = 500;

/// SqliteLedger は `procesadas` / `log_operaciones` テーブルへの追記ストア
///
/// # 実装詳細
/// - 1 接続を Mutex で共有（単一 writer）
/// - 同じ ID は `INSERT OR REPLACE` で後勝ち
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    /// ファイルを開く（無ければ作成）してスキーマを整える
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        Self::bootstrap(&conn)?;
        info!(path = %path.display(), "ledger opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// テスト用
    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        Self::bootstrap(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn bootstrap(conn: &Connection) -> Result<(), LedgerError> {
        conn.execute_batch(SCHEMA)?;

        let existing = {
            let mut stmt = conn.prepare("PRAGMA table_info(procesadas)")?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(1))?
                .collect::<Result<Vec<_>, _>>()?;
            names
        };
        for (column, ty) in LATE_COLUMNS {
            if !existing.iter().any(|c| c == column) {
                conn.execute(&format!("ALTER TABLE procesadas ADD COLUMN {column} {ty}"), [])?;
                info!(column, "ledger column added");
            }
        }
        Ok(())
    }

    /// 同期クロージャを blocking プールで実行
    async fn with_conn<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, LedgerError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| LedgerError::Poisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| LedgerError::Join(e.to_string()))?
    }
}

fn format_timestamp(at: &DateTime<Local>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// RFC 3339、古いファイルの `CURRENT_TIMESTAMP`（UTC）、日付だけ（ローカルの 0 時）
fn parse_timestamp(raw: &str) -> Option<DateTime<Local>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Local));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, LEGACY_TIMESTAMP_FORMAT) {
        return Some(Utc.from_utc_datetime(&naive).with_timezone(&Local));
    }
    let midnight = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)?;
    Local.from_local_datetime(&midnight).earliest()
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn append(&self, entry: LedgerEntry) -> Result<(), LedgerError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO procesadas (
                    id, fecha_proceso, usuario, empleado_cod, empleado_nombre,
                    tipo_sancion, fecha_original, tiempo_procesamiento
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entry.id.as_str(),
                    format_timestamp(&entry.processed_at),
                    entry.operator.as_str(),
                    entry.employee_code,
                    entry.employee_name,
                    entry.sanction_type,
                    entry.original_date,
                    entry.elapsed_secs,
                ],
            )?;
            debug!(sanction_id = %entry.id, "ledger row written");
            Ok(())
        })
        .await
    }

    async fn lookup(
        &self,
        ids: &[SanctionId],
    ) -> Result<HashMap<SanctionId, LedgerEntry>, LedgerError> {
        let ids: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        self.with_conn(move |conn| {
            let mut found = HashMap::new();
            for chunk in ids.chunks(LOOKUP_CHUNK) {
                let placeholders = vec!["?"; chunk.len()].join(",");
                let sql = format!(
                    "SELECT id, usuario, fecha_proceso, tiempo_procesamiento, empleado_cod,
                            empleado_nombre, tipo_sancion, fecha_original
                     FROM procesadas WHERE id IN ({placeholders})"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<f64>>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, Option<String>>(7)?,
                    ))
                })?;
                for row in rows {
                    let (id, operator, stamp, elapsed, code, name, ty, original) = row?;
                    let Some(processed_at) = stamp.as_deref().and_then(parse_timestamp) else {
                        debug!(sanction_id = %id, "ledger row without readable timestamp skipped");
                        continue;
                    };
                    let id = SanctionId::new(id);
                    found.insert(
                        id.clone(),
                        LedgerEntry {
                            id,
                            operator: OperatorId::new(operator.unwrap_or_default()),
                            processed_at,
                            elapsed_secs: elapsed.unwrap_or_default(),
                            employee_code: code,
                            employee_name: name,
                            sanction_type: ty,
                            original_date: original,
                        },
                    );
                }
            }
            Ok(found)
        })
        .await
    }

    async fn stats(&self, today: NaiveDate) -> Result<LedgerStats, LedgerError> {
        self.with_conn(move |conn| {
            let mut stats = LedgerStats {
                total_processed: conn.query_row("SELECT COUNT(*) FROM procesadas", [], |r| {
                    r.get::<_, i64>(0)
                })? as u64,
                ..LedgerStats::default()
            };

            let mut stmt = conn.prepare(
                "SELECT COALESCE(usuario, ''), COUNT(*) FROM procesadas GROUP BY usuario",
            )?;
            for row in stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))? {
                let (operator, count) = row?;
                *stats.by_operator.entry(operator).or_default() += count as u64;
            }

            let mut stmt = conn.prepare(
                "SELECT COALESCE(tipo_sancion, ''), COUNT(*) FROM procesadas GROUP BY tipo_sancion",
            )?;
            for row in stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))? {
                let (ty, count) = row?;
                *stats.by_type.entry(ty).or_default() += count as u64;
            }

            // 形式が混在するので日付の比較は読んでから
            let mut stmt = conn.prepare("SELECT fecha_proceso FROM procesadas")?;
            for stamp in stmt.query_map([], |r| r.get::<_, Option<String>>(0))? {
                if stamp?
                    .as_deref()
                    .and_then(parse_timestamp)
                    .is_some_and(|at| at.date_naive() == today)
                {
                    stats.processed_today += 1;
                }
            }

            let (avg, min, max) = conn.query_row(
                "SELECT AVG(tiempo_procesamiento), MIN(tiempo_procesamiento), MAX(tiempo_procesamiento)
                 FROM procesadas WHERE tiempo_procesamiento IS NOT NULL",
                [],
                |r| {
                    Ok((
                        r.get::<_, Option<f64>>(0)?,
                        r.get::<_, Option<f64>>(1)?,
                        r.get::<_, Option<f64>>(2)?,
                    ))
                },
            )?;
            if let (Some(avg), Some(min), Some(max)) = (avg, min, max) {
                stats.avg_elapsed_secs = round2(avg);
                stats.min_elapsed_secs = round2(min);
                stats.max_elapsed_secs = round2(max);
            }
            Ok(stats)
        })
        .await
    }

    async fn record_run(&self, run: RunRecord) -> Result<(), LedgerError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO log_operaciones (fecha, usuario, operacion, detalle, resultado)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    format_timestamp(&run.at),
                    run.operator.as_str(),
                    run.operation,
                    run.detail,
                    run.result,
                ],
            )?;
            Ok(())
        })
        .await
    }
}
