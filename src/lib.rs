//! e-med 药房客户端
//!
//! 本地存储键沿用网页端的写法（如 access_token、rememberMe）
//! 与服务器交换的字段使用下划线 "_"（如 delivery_partner_id）
//!
//! ## 功能模块
//! - 购物车：增删改、合计、落盘持久化
//! - 登录会话：登录、注册、登出、资料更新、启动时校验缓存凭据
//! - REST API：统一的 Bearer 认证与错误解析，401 时全局清除会话
//! - 实时通知桥：可选的 WebSocket 连接，有限次数的线性退避重连
//! - 订单状态：徽章与管理员操作映射
//! - 页面视图模型：目录、结算、订单、处方、管理员、配送员、通知
//! - 路由守卫：按登录状态和角色放行
//! - 订单缓存：本地 SQLite 缓存已拉取的订单
//!
//! ## 更新日志
//! - 2026-10-14: 从桌面聊天外壳改为无界面的药房客户端库

pub mod api;
pub mod app;
pub mod cart;
pub mod config;
pub mod db;
pub mod order_status;
pub mod realtime;
pub mod routes;
pub mod session;
pub mod storage;
pub mod types;
pub mod views;

pub use api::{ApiClient, ApiError};
pub use app::{ClientError, PharmacyClient};
pub use cart::CartStore;
pub use config::ClientConfig;
pub use realtime::{BridgeState, RealtimeBridge, WsMessage};
pub use session::{AuthSession, SessionEvent, SessionState};
