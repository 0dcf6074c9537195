//! 本地订单缓存模块
//!
//! 使用 rusqlite 缓存从服务器拉取的订单，请求进行中或离线时先展示缓存。
//! 服务器始终是权威来源，缓存只做读穿透，不参与任何状态判断。
//!
//! ## 模块结构
//!
//! - `orders`: 订单缓存的增删改查
//!
//! ## 数据库路径
//!
//! ```text
//! {data_dir}/cache/orders.db
//! ```
//!
//! 登出时清空，避免下一个登录的用户看到上一位的订单。

use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

pub mod orders;

/// 缓存错误类型
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// 数据库连接管理
// ============================================================================

/// 订单缓存（线程安全）
pub struct OrderCache {
    conn: Mutex<Connection>,
}

impl OrderCache {
    /// 打开数据库文件并创建表
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "初始化订单缓存");
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// 内存数据库（测试与无数据目录时使用）
    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CacheError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY,
                order_number TEXT NOT NULL,
                user_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                total_amount REAL NOT NULL,
                payload TEXT NOT NULL,
                fetched_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status)",
            [],
        )
        .ok();

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}
