use serde::Deserialize;

use crate::config::GeoConfig;

/// 归属地解析失败时的哨兵值。
pub const AREA_CODE_UNKNOWN: &str = "0";

/// IP 归属地查询响应中我们关心的字段
#[derive(Debug, Deserialize, Default)]
struct AreaCodeInfo {
    #[serde(default, rename = "adCode")]
    ad_code: String,
}

/// IP 归属地（行政区划代码）查询客户端。
///
/// 尽力而为：任何传输、解析失败或空结果都折叠为 "0"，
/// 归属地拿不到不影响登录建档的正确性。
pub struct GeoClient {
    client: reqwest::Client,
    endpoint: String,
}

impl GeoClient {
    pub fn new(cfg: &GeoConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: cfg.endpoint.clone(),
        }
    }

    /// 按客户端 IP 解析行政区划代码。
    pub async fn resolve_area_code(&self, ip: &str) -> String {
        let resp = match self
            .client
            .get(&self.endpoint)
            .query(&[("ip", ip)])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("归属地查询失败（已忽略）: {e}");
                return AREA_CODE_UNKNOWN.to_string();
            }
        };

        let info: AreaCodeInfo = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("归属地响应解析失败（已忽略）: {e}");
                return AREA_CODE_UNKNOWN.to_string();
            }
        };

        if info.ad_code.trim().is_empty() {
            AREA_CODE_UNKNOWN.to_string()
        } else {
            info.ad_code
        }
    }
}
