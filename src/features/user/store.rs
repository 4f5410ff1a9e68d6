use std::path::Path;

use chrono::Utc;
use sqlx::{ConnectOptions, SqlitePool, sqlite::SqliteConnectOptions};

use crate::error::AppError;

use super::models::UserRecord;

/// 新建用户的入库参数
pub struct NewUser<'a> {
    pub phone: &'a str,
    pub union_id: &'a str,
    pub open_id: &'a str,
    pub area_code: &'a str,
    pub client_ip: &'a str,
}

/// 用户持久化层。
///
/// union_id 上的唯一约束保证并发首登不会产生重复档案：
/// 冲突时 INSERT 静默跳过，随后按 union_id 回查即得既有行。
#[derive(Clone)]
pub struct UserStore {
    pub pool: SqlitePool,
}

impl UserStore {
    pub async fn connect_sqlite(path: &str, wal: bool) -> Result<Self, AppError> {
        let opt = SqliteConnectOptions::new()
            .filename(Path::new(path))
            .create_if_missing(true)
            .log_statements(tracing::log::LevelFilter::Off);
        let pool = SqlitePool::connect_with(opt)
            .await
            .map_err(|e| AppError::Database(format!("sqlite connect: {e}")))?;
        if wal
            && let Err(e) = sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await
        {
            tracing::warn!("启用 WAL 失败，沿用默认日志模式: {e}");
        }
        for pragma in ["PRAGMA synchronous=NORMAL;", "PRAGMA foreign_keys=ON;"] {
            if let Err(e) = sqlx::query(pragma).execute(&pool).await {
                tracing::warn!("执行 {pragma} 失败: {e}");
            }
        }
        Ok(Self { pool })
    }

    pub async fn init_schema(&self) -> Result<(), AppError> {
        let ddl = r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            phone TEXT NOT NULL,
            union_id TEXT NOT NULL UNIQUE,
            open_id TEXT NOT NULL,
            area_code TEXT NOT NULL DEFAULT '0',
            client_ip TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_users_open_id ON users(open_id);
        "#;
        sqlx::raw_sql(ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("init schema: {e}")))?;
        Ok(())
    }

    /// 按 UnionID 查询用户，不存在返回 None。
    pub async fn find_by_union_id(&self, union_id: &str) -> Result<Option<UserRecord>, AppError> {
        let row = sqlx::query_as::<_, UserRecord>(
            "SELECT id, phone, union_id, open_id, area_code, client_ip, created_at \
             FROM users WHERE union_id = ?",
        )
        .bind(union_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("查询用户失败: {e}")))?;
        Ok(row)
    }

    /// 幂等建档：同一 UnionID 至多创建一行。
    ///
    /// 并发首登时只有一个 INSERT 生效，落败方回查返回同一行，
    /// 调用方不感知竞争。
    pub async fn create(&self, user: NewUser<'_>) -> Result<UserRecord, AppError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO users(phone, union_id, open_id, area_code, client_ip, created_at) \
             VALUES(?, ?, ?, ?, ?, ?) \
             ON CONFLICT(union_id) DO NOTHING",
        )
        .bind(user.phone)
        .bind(user.union_id)
        .bind(user.open_id)
        .bind(user.area_code)
        .bind(user.client_ip)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("创建用户失败: {e}")))?;

        self.find_by_union_id(user.union_id)
            .await?
            .ok_or_else(|| AppError::Database("创建用户后回查失败".to_string()))
    }
}
