//! 购物车模块
//!
//! 药品 → 数量的映射，保存在内存中并同步写入本地存储 `cart` 键。
//!
//! ## 规则
//! - 同一药品只占一行，重复加入时数量累加
//! - 数量 ≤ 0 时删除该行，单行数量上限 `MAX_LINE_QUANTITY`
//! - 每次修改后重新计算行小计 `medicine_price × quantity`
//! - 启动时存储内容无法解析：清除该键，以空购物车开始
//!
//! 价格与库存不在客户端对账，结算时以后端为准。

use chrono::Utc;
use parking_lot::RwLock;

use crate::storage::{CART_KEY, LocalStorage, StorageError};
use crate::types::{CartItem, Medicine, NewOrderItem};

/// 单行数量上限，超出部分截断
pub const MAX_LINE_QUANTITY: u32 = 9_999;

/// 购物车
pub struct CartStore {
    storage: LocalStorage,
    items: RwLock<Vec<CartItem>>,
}

impl CartStore {
    /// 从本地存储加载购物车
    pub fn load(storage: LocalStorage) -> Self {
        let items = match storage.get_item(CART_KEY) {
            Some(content) => match serde_json::from_str::<Vec<CartItem>>(&content) {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!(error = %e, "购物车数据损坏，已丢弃");
                    if let Err(e) = storage.remove_item(CART_KEY) {
                        tracing::warn!(error = %e, "清除损坏的购物车数据失败");
                    }
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        tracing::debug!(lines = items.len(), "购物车已加载");

        Self {
            storage,
            items: RwLock::new(items),
        }
    }

    /// 加入购物车（已存在则累加数量）
    pub fn add_to_cart(&self, medicine: &Medicine, quantity: u32) -> Result<(), StorageError> {
        if quantity == 0 {
            return Ok(());
        }

        let mut items = self.items.write();

        if let Some(item) = items.iter_mut().find(|i| i.medicine_id == medicine.id) {
            item.quantity = capped(item.quantity.saturating_add(quantity));
            item.total_price = item.medicine_price * item.quantity as f64;
        } else {
            let quantity = capped(quantity);
            items.push(CartItem {
                id: uuid::Uuid::new_v4().to_string(),
                medicine_id: medicine.id,
                quantity,
                medicine_name: medicine.name.clone(),
                medicine_price: medicine.price,
                total_price: medicine.price * quantity as f64,
                created_at: Utc::now().to_rfc3339(),
            });
        }

        self.persist(&items)
    }

    pub fn remove_from_cart(&self, medicine_id: i64) -> Result<(), StorageError> {
        let mut items = self.items.write();
        items.retain(|i| i.medicine_id != medicine_id);
        self.persist(&items)
    }

    /// 修改数量，`quantity <= 0` 时删除该行
    pub fn update_quantity(&self, medicine_id: i64, quantity: i64) -> Result<(), StorageError> {
        if quantity <= 0 {
            return self.remove_from_cart(medicine_id);
        }

        let quantity = capped(u32::try_from(quantity).unwrap_or(u32::MAX));
        let mut items = self.items.write();
        if let Some(item) = items.iter_mut().find(|i| i.medicine_id == medicine_id) {
            item.quantity = quantity;
            item.total_price = item.medicine_price * quantity as f64;
        }
        self.persist(&items)
    }

    pub fn clear_cart(&self) -> Result<(), StorageError> {
        let mut items = self.items.write();
        items.clear();
        self.persist(&items)
    }

    /// 行小计之和
    pub fn cart_total(&self) -> f64 {
        self.items.read().iter().map(|i| i.total_price).sum()
    }

    /// 数量之和
    pub fn item_count(&self) -> u64 {
        self.items.read().iter().map(|i| u64::from(i.quantity)).sum()
    }

    pub fn is_in_cart(&self, medicine_id: i64) -> bool {
        self.items.read().iter().any(|i| i.medicine_id == medicine_id)
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn items(&self) -> Vec<CartItem> {
        self.items.read().clone()
    }

    /// 转换为下单请求行
    pub fn order_lines(&self) -> Vec<NewOrderItem> {
        self.items
            .read()
            .iter()
            .map(|i| NewOrderItem {
                medicine_id: i.medicine_id,
                quantity: i.quantity,
            })
            .collect()
    }

    fn persist(&self, items: &[CartItem]) -> Result<(), StorageError> {
        let content = serde_json::to_string(items)?;
        self.storage.set_item(CART_KEY, &content)
    }
}

fn capped(quantity: u32) -> u32 {
    if quantity > MAX_LINE_QUANTITY {
        tracing::warn!(quantity, max = MAX_LINE_QUANTITY, "购物车数量超出上限，已截断");
    }
    quantity.min(MAX_LINE_QUANTITY)
}
