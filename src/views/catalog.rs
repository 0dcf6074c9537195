//! 药品目录视图
//!
//! 一次加载全部药品和分类，筛选在客户端线性完成。

use std::sync::Arc;

use super::ViewState;
use crate::api::{ApiClient, MedicineQuery};
use crate::cart::CartStore;
use crate::storage::StorageError;
use crate::types::{Category, Medicine};

/// 药品筛选条件
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MedicineFilters {
    /// 匹配名称、通用名或生产商（不区分大小写）
    pub search: String,
    pub category_id: Option<i64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub prescription_required: Option<bool>,
    pub in_stock_only: bool,
}

impl MedicineFilters {
    pub fn matches(&self, medicine: &Medicine) -> bool {
        let search = self.search.trim().to_lowercase();
        if !search.is_empty() {
            let contains = |field: Option<&str>| {
                field.is_some_and(|value| value.to_lowercase().contains(&search))
            };
            if !contains(Some(medicine.name.as_str()))
                && !contains(medicine.generic_name.as_deref())
                && !contains(medicine.manufacturer.as_deref())
            {
                return false;
            }
        }

        if let Some(category_id) = self.category_id
            && medicine.category_id != Some(category_id)
        {
            return false;
        }
        if self.min_price.is_some_and(|min| medicine.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| medicine.price > max) {
            return false;
        }
        if let Some(required) = self.prescription_required
            && medicine.prescription_required != required
        {
            return false;
        }
        if self.in_stock_only && !medicine.in_stock() {
            return false;
        }

        true
    }

    pub fn apply<'a>(&self, medicines: &'a [Medicine]) -> Vec<&'a Medicine> {
        medicines.iter().filter(|m| self.matches(m)).collect()
    }

    pub fn has_active_filters(&self) -> bool {
        *self != Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// 转换为服务器端查询参数
    pub fn to_query(&self) -> MedicineQuery {
        let search = self.search.trim();
        MedicineQuery {
            search: (!search.is_empty()).then(|| search.to_string()),
            category_id: self.category_id,
            prescription_required: self.prescription_required,
            min_price: self.min_price,
            max_price: self.max_price,
            in_stock: self.in_stock_only.then_some(true),
            ..Default::default()
        }
    }
}

/// 目录数据
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    pub medicines: Vec<Medicine>,
    pub categories: Vec<Category>,
}

/// 药品目录视图
pub struct CatalogView {
    api: ApiClient,
    cart: Arc<CartStore>,
    state: ViewState<Catalog>,
    pub filters: MedicineFilters,
}

impl CatalogView {
    pub fn new(api: ApiClient, cart: Arc<CartStore>) -> Self {
        Self {
            api,
            cart,
            state: ViewState::Loading,
            filters: MedicineFilters::default(),
        }
    }

    pub fn state(&self) -> &ViewState<Catalog> {
        &self.state
    }

    /// 同时加载药品和分类
    pub async fn load(&mut self) {
        self.state = ViewState::Loading;
        let query = MedicineQuery::default();
        let result = tokio::try_join!(self.api.get_medicines(&query), self.api.get_categories());

        self.state = ViewState::from_result(result.map(|(medicines, categories)| Catalog {
            medicines,
            categories,
        }));
        if let Some(error) = self.state.error() {
            tracing::warn!(%error, "药品目录加载失败");
        }
    }

    /// 当前筛选后的药品
    pub fn visible(&self) -> Vec<&Medicine> {
        match &self.state {
            ViewState::Ready(catalog) => self.filters.apply(&catalog.medicines),
            _ => Vec::new(),
        }
    }

    pub fn category_name(&self, category_id: i64) -> Option<&str> {
        self.state
            .ready()?
            .categories
            .iter()
            .find(|c| c.id == category_id)
            .map(|c| c.name.as_str())
    }

    /// 加入购物车，目录中没有该药品时返回 `false`
    pub fn add_to_cart(&self, medicine_id: i64, quantity: u32) -> Result<bool, StorageError> {
        let Some(medicine) = self
            .state
            .ready()
            .and_then(|c| c.medicines.iter().find(|m| m.id == medicine_id))
        else {
            return Ok(false);
        };
        self.cart.add_to_cart(medicine, quantity)?;
        Ok(true)
    }
}
