//! 订单缓存操作
//!
//! - `save_order` / `save_orders`: 写入或覆盖（按订单 ID）
//! - `get_order`: 读取单个订单
//! - `list_orders`: 按 ID 倒序列出（新订单在前）
//! - `update_status`: 本地修改状态（取消成功后）
//! - `clear`: 清空

use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::{CacheError, OrderCache};
use crate::types::{Order, OrderStatus};

const UPSERT_SQL: &str = "INSERT OR REPLACE INTO orders
    (id, order_number, user_id, status, total_amount, payload, fetched_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

impl OrderCache {
    pub fn save_order(&self, order: &Order) -> Result<(), CacheError> {
        let payload = serde_json::to_string(order)?;
        let conn = self.conn.lock();
        conn.execute(
            UPSERT_SQL,
            params![
                order.id,
                order.order_number,
                order.user_id,
                order.status.as_str(),
                order.total_amount,
                payload,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// 批量写入（单个事务）
    pub fn save_orders(&self, orders: &[Order]) -> Result<usize, CacheError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let fetched_at = Utc::now().to_rfc3339();

        {
            let mut stmt = tx.prepare(UPSERT_SQL)?;
            for order in orders {
                let payload = serde_json::to_string(order)?;
                stmt.execute(params![
                    order.id,
                    order.order_number,
                    order.user_id,
                    order.status.as_str(),
                    order.total_amount,
                    payload,
                    fetched_at,
                ])?;
            }
        }

        tx.commit()?;
        Ok(orders.len())
    }

    pub fn get_order(&self, id: i64) -> Result<Option<Order>, CacheError> {
        let conn = self.conn.lock();
        let payload: Option<String> = conn
            .query_row("SELECT payload FROM orders WHERE id = ?", [id], |row| row.get(0))
            .optional()?;

        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    pub fn list_orders(&self) -> Result<Vec<Order>, CacheError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT payload FROM orders ORDER BY id DESC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut orders = Vec::new();
        for row in rows {
            let payload = row?;
            match serde_json::from_str::<Order>(&payload) {
                Ok(order) => orders.push(order),
                Err(e) => tracing::warn!(error = %e, "跳过无法解析的缓存订单"),
            }
        }

        Ok(orders)
    }

    /// 修改缓存订单的状态，返回是否找到该订单
    pub fn update_status(&self, id: i64, status: OrderStatus) -> Result<bool, CacheError> {
        let Some(mut order) = self.get_order(id)? else {
            return Ok(false);
        };
        order.status = status;
        self.save_order(&order)?;
        Ok(true)
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM orders", [])?;
        tracing::debug!(removed, "订单缓存已清空");
        Ok(())
    }
}
