/*!
 * 客户端配置管理模块
 *
 * 管理客户端的配置，包括：
 * - REST API 地址与服务器地址（WebSocket 由服务器地址推导）
 * - 实时通知开关与重连参数
 * - 本地数据目录
 *
 * 加载顺序：默认值 → 数据目录下的 config.json → .env → 环境变量
 */

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

// ============================================================================
// 常量
// ============================================================================

/// 配置文件名
pub const CONFIG_FILE_NAME: &str = "config.json";

/// 数据目录名
const APP_DIR_NAME: &str = "emed-client";

/// WebSocket 连接路径
const WS_CONNECT_PATH: &str = "/api/v1/ws/connect";

pub const ENV_API_URL: &str = "EMED_API_URL";
pub const ENV_SERVER_URL: &str = "EMED_SERVER_URL";
pub const ENV_REALTIME: &str = "EMED_REALTIME";
pub const ENV_DATA_DIR: &str = "EMED_DATA_DIR";

// ============================================================================
// 错误类型
// ============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件读写失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("配置文件格式错误: {0}")]
    Json(#[from] serde_json::Error),
    #[error("无效的地址: {0}")]
    InvalidUrl(String),
    #[error("无效的配置值 {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("找不到本地数据目录")]
    NoDataDir,
}

// ============================================================================
// 配置结构
// ============================================================================

/// 客户端配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// REST API 基础地址（含 /api/v1）
    pub api_base_url: String,
    /// 服务器地址（WebSocket 地址由此推导）
    pub server_url: String,
    /// 是否启用实时通知
    pub realtime_enabled: bool,
    /// 断线后最多重连次数
    pub max_reconnect_attempts: u32,
    /// 重连基础延迟（第 n 次重连等待 n × 基础延迟）
    pub reconnect_base_delay_ms: u64,
    /// 本地数据目录（不写入配置文件）
    #[serde(skip)]
    pub data_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api/v1".to_string(),
            server_url: "http://localhost:8000".to_string(),
            realtime_enabled: false,
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 1000,
            data_dir: PathBuf::from(APP_DIR_NAME),
        }
    }
}

impl ClientConfig {
    /// 默认数据目录：`dirs::data_local_dir()/emed-client`
    pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
        let base = dirs::data_local_dir().ok_or(ConfigError::NoDataDir)?;
        Ok(base.join(APP_DIR_NAME))
    }

    /// 按完整顺序加载配置
    pub fn load() -> Result<Self, ConfigError> {
        // .env 不存在不算错误
        let _ = dotenvy::dotenv();

        let data_dir = match std::env::var(ENV_DATA_DIR) {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => Self::default_data_dir()?,
        };

        let mut config = Self::load_from(&data_dir)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// 从数据目录读取 config.json，不存在时写入默认配置
    pub fn load_from(data_dir: &Path) -> Result<Self, ConfigError> {
        if !data_dir.exists() {
            fs::create_dir_all(data_dir)?;
        }

        let path = data_dir.join(CONFIG_FILE_NAME);
        let mut config = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str::<ClientConfig>(&content)?
        } else {
            let config = ClientConfig::default();
            fs::write(&path, serde_json::to_string_pretty(&config)?)?;
            tracing::info!(path = %path.display(), "已写入默认配置");
            config
        };

        config.data_dir = data_dir.to_path_buf();
        Ok(config)
    }

    /// 保存到数据目录
    pub fn save(&self) -> Result<(), ConfigError> {
        if !self.data_dir.exists() {
            fs::create_dir_all(&self.data_dir)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(self.data_dir.join(CONFIG_FILE_NAME), content)?;
        Ok(())
    }

    /// 用环境变量覆盖配置项（`lookup` 便于测试时注入）
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(url) = lookup(ENV_SERVER_URL) {
            self.server_url = url;
        }
        if let Some(value) = lookup(ENV_REALTIME) {
            self.realtime_enabled = parse_bool(ENV_REALTIME, &value)?;
        }
        Ok(())
    }

    /// API 基础地址（去掉末尾斜杠）
    pub fn api_base(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }

    /// WebSocket 连接地址：`{ws 服务器地址}/api/v1/ws/connect?token=<token>`
    pub fn websocket_url(&self, token: &str) -> Result<Url, ConfigError> {
        let server = self.server_url.trim_end_matches('/');
        let ws_base = server
            .strip_prefix("http")
            .map(|rest| format!("ws{}", rest))
            .unwrap_or_else(|| server.to_string());

        let mut url = Url::parse(&format!("{}{}", ws_base, WS_CONNECT_PATH))
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", ws_base, e)))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }

    /// 第 `attempt` 次重连前的等待时间
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms * attempt as u64)
    }

    pub fn storage_dir(&self) -> &Path {
        &self.data_dir
    }

    /// 订单缓存数据库路径
    pub fn cache_db_path(&self) -> PathBuf {
        self.data_dir.join("cache").join("orders.db")
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_websocket_url_from_server_url() {
        let config = ClientConfig::default();
        let url = config.websocket_url("tok en").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8000/api/v1/ws/connect?token=tok+en");

        let secure = ClientConfig {
            server_url: "https://pharmacy.example.com/".to_string(),
            ..ClientConfig::default()
        };
        assert_eq!(
            secure.websocket_url("t").unwrap().as_str(),
            "wss://pharmacy.example.com/api/v1/ws/connect?token=t"
        );
    }

    #[test]
    fn test_reconnect_delay_grows_linearly() {
        let config = ClientConfig::default();
        assert_eq!(config.reconnect_delay(1), Duration::from_millis(1000));
        assert_eq!(config.reconnect_delay(5), Duration::from_millis(5000));
    }

    #[test]
    fn test_load_from_writes_defaults_then_reads_them() {
        let dir = tempfile::tempdir().unwrap();
        let created = ClientConfig::load_from(dir.path()).unwrap();
        assert!(dir.path().join(CONFIG_FILE_NAME).exists());

        let mut changed = created.clone();
        changed.realtime_enabled = true;
        changed.save().unwrap();

        let loaded = ClientConfig::load_from(dir.path()).unwrap();
        assert!(loaded.realtime_enabled);
        assert_eq!(loaded.data_dir, dir.path());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_API_URL, "http://api.test/api/v1/"),
            (ENV_REALTIME, "yes"),
        ]);
        let mut config = ClientConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.api_base(), "http://api.test/api/v1");
        assert!(config.realtime_enabled);

        let bad = config.apply_overrides(|key| (key == ENV_REALTIME).then(|| "maybe".to_string()));
        assert!(matches!(bad, Err(ConfigError::InvalidValue { .. })));
    }
}
