//! 本地持久化存储模块
//!
//! 键值形式的本地存储，所有键保存在数据目录下的同一个 JSON 文件里：
//!
//! ```text
//! {data_dir}/storage.json
//!   ├── cart          # 购物车行（JSON 数组字符串）
//!   ├── access_token  # Bearer 令牌
//!   ├── user          # 当前用户（JSON 字符串）
//!   └── rememberMe    # 记住登录
//! ```
//!
//! 值一律按原始字符串保存，由调用方负责解析，解析失败时由调用方决定如何降级。
//! 每次写入都同步落盘。

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::types::User;

// ============================================================================
// 存储键
// ============================================================================

pub const CART_KEY: &str = "cart";
pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const USER_KEY: &str = "user";
pub const REMEMBER_ME_KEY: &str = "rememberMe";

/// 存储文件名
pub const STORAGE_FILE_NAME: &str = "storage.json";

/// 存储错误类型
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// 存储文件结构
#[derive(Serialize, Deserialize, Default)]
struct StorageFile {
    items: BTreeMap<String, String>,
}

struct Inner {
    /// `None` 表示纯内存存储（测试用）
    path: Option<PathBuf>,
    items: BTreeMap<String, String>,
}

/// 本地存储句柄（可克隆，克隆体共享同一份数据）
#[derive(Clone)]
pub struct LocalStorage {
    inner: Arc<Mutex<Inner>>,
}

impl LocalStorage {
    /// 打开数据目录下的存储文件
    ///
    /// 文件不存在时从空存储开始；文件损坏时记录警告并从空存储开始，
    /// 下一次写入会覆盖损坏的文件
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        if !data_dir.exists() {
            fs::create_dir_all(data_dir)?;
        }

        let path = data_dir.join(STORAGE_FILE_NAME);
        let items = if path.exists() {
            let content = fs::read_to_string(&path)?;
            match serde_json::from_str::<StorageFile>(&content) {
                Ok(file) => file.items,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "存储文件损坏，已重置");
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), keys = items.len(), "本地存储已打开");

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                path: Some(path),
                items,
            })),
        })
    }

    /// 纯内存存储，不落盘
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                path: None,
                items: BTreeMap::new(),
            })),
        }
    }

    pub fn get_item(&self, key: &str) -> Option<String> {
        self.inner.lock().items.get(key).cloned()
    }

    pub fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        inner.items.insert(key.to_string(), value.to_string());
        flush(&inner)
    }

    pub fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        if inner.items.remove(key).is_none() {
            return Ok(());
        }
        flush(&inner)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().items.contains_key(key)
    }

    // ========================================================================
    // 会话相关的便捷方法
    // ========================================================================

    pub fn set_auth_token(&self, token: &str) -> Result<(), StorageError> {
        self.set_item(ACCESS_TOKEN_KEY, token)
    }

    pub fn get_auth_token(&self) -> Option<String> {
        self.get_item(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    /// 移除令牌，同时移除缓存的用户
    pub fn remove_auth_token(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        inner.items.remove(ACCESS_TOKEN_KEY);
        inner.items.remove(USER_KEY);
        flush(&inner)
    }

    pub fn set_user(&self, user: &User) -> Result<(), StorageError> {
        let content = serde_json::to_string(user)?;
        self.set_item(USER_KEY, &content)
    }

    /// 读取缓存的用户，内容无法解析时视为没有
    pub fn get_user(&self) -> Option<User> {
        let content = self.get_item(USER_KEY)?;
        match serde_json::from_str(&content) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!(error = %e, "缓存的用户信息无法解析");
                None
            }
        }
    }

    pub fn remove_user(&self) -> Result<(), StorageError> {
        self.remove_item(USER_KEY)
    }

    pub fn set_remember_me(&self, enabled: bool) -> Result<(), StorageError> {
        if enabled {
            self.set_item(REMEMBER_ME_KEY, "true")
        } else {
            self.remove_item(REMEMBER_ME_KEY)
        }
    }

    pub fn remember_me(&self) -> bool {
        self.get_item(REMEMBER_ME_KEY).as_deref() == Some("true")
    }
}

/// 写入存储文件
fn flush(inner: &Inner) -> Result<(), StorageError> {
    let Some(path) = &inner.path else {
        return Ok(());
    };

    let file = StorageFile {
        items: inner.items.clone(),
    };
    let content = serde_json::to_string_pretty(&file)?;
    fs::write(path, content)?;

    Ok(())
}
