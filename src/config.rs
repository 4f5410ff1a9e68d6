use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 全局配置单例
static CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 日志格式
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "plain".to_string(),
        }
    }
}

/// API 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API 路由前缀
    pub prefix: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            prefix: "/api".to_string(),
        }
    }
}

/// 微信小程序配置
///
/// 端点全部可配置：生产环境使用微信官方域名，集成测试指向本地 mock。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WechatConfig {
    /// 小程序 AppID
    #[serde(default)]
    pub app_id: String,
    /// 小程序 AppSecret
    #[serde(default)]
    pub app_secret: String,
    /// code2session 端点
    pub jscode2session_endpoint: String,
    /// 稳定版接口调用凭证端点
    pub stable_token_endpoint: String,
    /// 小程序二维码端点（B 端码，数量有限）
    pub create_qrcode_endpoint: String,
    /// 小程序码端点（数量有限）
    pub wxacode_endpoint: String,
    /// 小程序码端点（数量不限，携带 scene）
    pub wxacode_unlimited_endpoint: String,
    /// 上游请求超时（秒）
    #[serde(default = "WechatConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl WechatConfig {
    fn default_timeout_secs() -> u64 {
        10
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for WechatConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_secret: String::new(),
            jscode2session_endpoint: "https://api.weixin.qq.com/sns/jscode2session".to_string(),
            stable_token_endpoint: "https://api.weixin.qq.com/cgi-bin/stable_token".to_string(),
            create_qrcode_endpoint: "https://api.weixin.qq.com/cgi-bin/wxaapp/createwxaqrcode"
                .to_string(),
            wxacode_endpoint: "https://api.weixin.qq.com/wxa/getwxacode".to_string(),
            wxacode_unlimited_endpoint: "https://api.weixin.qq.com/wxa/getwxacodeunlimit"
                .to_string(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

/// 公众号回调配置
///
/// token 为空视为未启用，回调路由直接拒绝，避免半配置状态下放行未校验的请求。
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OfficialConfig {
    /// 公众号 AppID
    #[serde(default)]
    pub app_id: String,
    /// 消息校验 Token（公众号后台服务器配置页填写的那一个）
    #[serde(default)]
    pub message_token: String,
}

impl OfficialConfig {
    pub fn enabled(&self) -> bool {
        !self.message_token.trim().is_empty()
    }
}

/// IP 归属地（行政区划代码）查询配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    /// 查询端点，追加 `?ip=<ip>` 调用
    pub endpoint: String,
    /// 查询超时（秒）。尽力而为的辅助请求，超时宜短。
    #[serde(default = "GeoConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl GeoConfig {
    fn default_timeout_secs() -> u64 {
        3
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.xtjzx.cn/geo-tool-pub/loc".to_string(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite 文件路径
    pub path: String,
    /// 是否启用 WAL
    #[serde(default = "DatabaseConfig::default_wal")]
    pub wal: bool,
}

impl DatabaseConfig {
    fn default_wal() -> bool {
        true
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "./data/wx-bridge.db".to_string(),
            wal: Self::default_wal(),
        }
    }
}

/// 访问令牌（会话 JWT）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTokenConfig {
    /// 签名密钥；留空时回退读取环境变量 APP_SESSION_JWT_SECRET
    #[serde(default)]
    pub jwt_secret: String,
    /// 签发者
    #[serde(default = "SessionTokenConfig::default_issuer")]
    pub jwt_issuer: String,
    /// 受众
    #[serde(default = "SessionTokenConfig::default_audience")]
    pub jwt_audience: String,
    /// 有效期（秒）
    #[serde(default = "SessionTokenConfig::default_ttl_secs")]
    pub ttl_secs: u64,
}

impl SessionTokenConfig {
    fn default_issuer() -> String {
        "wx-bridge".to_string()
    }

    fn default_audience() -> String {
        "wx-miniapp".to_string()
    }

    fn default_ttl_secs() -> u64 {
        7 * 24 * 3600
    }
}

impl Default for SessionTokenConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_issuer: Self::default_issuer(),
            jwt_audience: Self::default_audience(),
            ttl_secs: Self::default_ttl_secs(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    /// 微信小程序配置
    #[serde(default)]
    pub wechat: WechatConfig,
    /// 公众号回调配置
    #[serde(default)]
    pub official: OfficialConfig,
    /// IP 归属地查询配置
    #[serde(default)]
    pub geo: GeoConfig,
    /// 数据库配置
    #[serde(default)]
    pub database: DatabaseConfig,
    /// 访问令牌配置
    #[serde(default)]
    pub session: SessionTokenConfig,
}

impl AppConfig {
    /// 从配置文件加载配置，支持环境变量覆盖
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path();

        tracing::info!("正在从 {:?} 加载配置文件", config_path);

        let builder = ConfigBuilder::builder()
            // 配置文件允许缺省：纯环境变量部署（容器）无需挂载 config.toml
            .add_source(File::with_name(config_path.to_str().unwrap()).required(false))
            // 支持环境变量覆盖，例如：APP_WECHAT_APP_ID
            .add_source(
                Environment::with_prefix("APP")
                    .separator("_")
                    .try_parsing(true),
            )
            .build()?;

        builder.try_deserialize()
    }

    /// 获取全局配置单例
    pub fn global() -> &'static AppConfig {
        CONFIG.get().expect("配置未初始化，请先调用 init_global()")
    }

    /// 初始化全局配置
    pub fn init_global() -> Result<(), ConfigError> {
        let config = Self::load()?;
        CONFIG
            .set(config)
            .map_err(|_| ConfigError::Message("配置已经被初始化".to_string()))?;
        Ok(())
    }

    /// 获取配置文件路径
    fn get_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
