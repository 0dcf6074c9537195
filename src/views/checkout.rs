//! 结算
//!
//! 提交前在本地校验（不发请求）：
//! - 购物车不能为空
//! - 配送地址不能为空白
//! - 加急订单必须填写原因
//!
//! 费用预估：配送费 5.00，加急另加 15.00；最终金额以服务器返回为准。

use thiserror::Error;

use crate::api::{ApiClient, ApiError};
use crate::cart::CartStore;
use crate::types::{NewOrder, User};

pub const DELIVERY_FEE: f64 = 5.0;
pub const EMERGENCY_FEE: f64 = 15.0;

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("Your cart is empty")]
    EmptyCart,

    #[error("Delivery address is required")]
    MissingAddress,

    #[error("Emergency reason is required for emergency orders")]
    MissingEmergencyReason,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// 费用预估
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeEstimate {
    pub subtotal: f64,
    pub delivery_fee: f64,
    pub emergency_fee: f64,
    pub total: f64,
}

pub fn estimate_fees(subtotal: f64, is_emergency: bool) -> FeeEstimate {
    let emergency_fee = if is_emergency { EMERGENCY_FEE } else { 0.0 };
    FeeEstimate {
        subtotal,
        delivery_fee: DELIVERY_FEE,
        emergency_fee,
        total: subtotal + DELIVERY_FEE + emergency_fee,
    }
}

/// 下单成功后带给订单详情页的信息
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSeed {
    pub order_id: i64,
    pub order_number: String,
    /// 客户端预估的总额
    pub total: f64,
}

/// 结算表单
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckoutForm {
    pub delivery_address: String,
    pub delivery_instructions: String,
    pub is_emergency: bool,
    pub emergency_reason: String,
}

impl CheckoutForm {
    /// 用当前用户的地址预填
    pub fn for_user(user: Option<&User>) -> Self {
        Self {
            delivery_address: user.and_then(|u| u.address.clone()).unwrap_or_default(),
            ..Default::default()
        }
    }

    pub fn validate(&self, cart: &CartStore) -> Result<(), CheckoutError> {
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        if self.delivery_address.trim().is_empty() {
            return Err(CheckoutError::MissingAddress);
        }
        if self.is_emergency && self.emergency_reason.trim().is_empty() {
            return Err(CheckoutError::MissingEmergencyReason);
        }
        Ok(())
    }

    pub fn fees(&self, cart: &CartStore) -> FeeEstimate {
        estimate_fees(cart.cart_total(), self.is_emergency)
    }

    /// 下单请求，非加急订单不带原因
    pub fn to_order(&self, cart: &CartStore) -> NewOrder {
        NewOrder {
            delivery_address: self.delivery_address.clone(),
            delivery_instructions: self.delivery_instructions.clone(),
            is_emergency: self.is_emergency,
            emergency_reason: self.is_emergency.then(|| self.emergency_reason.clone()),
            items: cart.order_lines(),
            prescription_ids: None,
        }
    }
}

/// 校验并提交订单，成功后清空购物车
pub async fn submit(
    api: &ApiClient,
    cart: &CartStore,
    form: &CheckoutForm,
) -> Result<OrderSeed, CheckoutError> {
    form.validate(cart)?;

    let total = form.fees(cart).total;
    let order = api.create_order(&form.to_order(cart)).await?;

    tracing::info!(
        order_id = order.id,
        order_number = %order.order_number,
        emergency = form.is_emergency,
        "订单已提交"
    );

    if let Err(e) = cart.clear_cart() {
        tracing::warn!(error = %e, "下单后清空购物车失败");
    }

    Ok(OrderSeed {
        order_id: order.id,
        order_number: order.order_number,
        total,
    })
}
