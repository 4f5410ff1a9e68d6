use aes::Aes128;
use aes::cipher::{BlockDecryptMut, KeyIvInit, block_padding::Pkcs7};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::config::WechatConfig;
use crate::error::AppError;

use super::models::{QrCodeArgs, Session, UnlimitedWxaCodeArgs, WxaCodeArgs};

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// 接口调用凭证缓存。微信返回的 expires_in 单位是秒，
/// 提前 5 分钟视为过期，避免边界上拿到将失效的凭证。
#[derive(Default)]
struct CachedAccessToken {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl CachedAccessToken {
    fn usable(&self, now: DateTime<Utc>) -> Option<String> {
        match self.expires_at {
            Some(at) if at > now && !self.token.is_empty() => Some(self.token.clone()),
            _ => None,
        }
    }
}

/// 微信小程序平台客户端
///
/// 封装 code2session、加密数据解密、接口调用凭证与小程序码接口。
/// 除凭证缓存外无状态；凭证缓存对调用方透明。
pub struct WechatClient {
    client: reqwest::Client,
    cfg: WechatConfig,
    access_token: RwLock<CachedAccessToken>,
}

impl WechatClient {
    pub fn new(cfg: &WechatConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .build()
            .map_err(|e| AppError::Internal(format!("初始化 HTTP Client 失败: {e}")))?;

        Ok(Self {
            client,
            cfg: cfg.clone(),
            access_token: RwLock::new(CachedAccessToken::default()),
        })
    }

    /// 用小程序端的一次性授权码换取会话。
    ///
    /// 传输失败、响应不可解析、errcode != 0 一律视为平台认证失败，
    /// 由调用方直接终止请求，不做重试。
    pub async fn code_to_session(&self, code: &str) -> Result<Session, AppError> {
        let resp = self
            .client
            .get(&self.cfg.jscode2session_endpoint)
            .query(&[
                ("appid", self.cfg.app_id.as_str()),
                ("secret", self.cfg.app_secret.as_str()),
                ("js_code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::WechatAuth(format!("会话交换请求失败: {e}")))?;

        let session: Session = resp
            .json()
            .await
            .map_err(|e| AppError::WechatAuth(format!("会话交换响应解析失败: {e}")))?;

        if session.errcode != 0 {
            return Err(AppError::WechatAuth(format!(
                "会话交换失败: errcode={} errmsg={}",
                session.errcode, session.errmsg
            )));
        }
        Ok(session)
    }

    /// 解密手机号授权数据，AES-128-CBC，PKCS#7 填充。
    ///
    /// https://developers.weixin.qq.com/miniprogram/dev/framework/open-ability/signature.html
    pub fn decrypt_data(
        encrypted_data: &str,
        session_key: &str,
        iv: &str,
    ) -> Result<Vec<u8>, AppError> {
        let key = BASE64
            .decode(session_key.as_bytes())
            .map_err(|e| AppError::Decrypt(format!("session_key 不是合法 base64: {e}")))?;
        let iv = BASE64
            .decode(iv.as_bytes())
            .map_err(|e| AppError::Decrypt(format!("iv 不是合法 base64: {e}")))?;
        let ciphertext = BASE64
            .decode(encrypted_data.as_bytes())
            .map_err(|e| AppError::Decrypt(format!("密文不是合法 base64: {e}")))?;

        let decryptor = Aes128CbcDec::new_from_slices(&key, &iv)
            .map_err(|_| AppError::Decrypt("密钥或 iv 长度非法".to_string()))?;

        decryptor
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| AppError::Decrypt("密文解密失败或填充非法".to_string()))
    }

    /// 获取稳定版接口调用凭证，带进程内缓存。
    pub async fn access_token(&self) -> Result<String, AppError> {
        let now = Utc::now();
        if let Some(token) = self.access_token.read().await.usable(now) {
            return Ok(token);
        }

        let mut guard = self.access_token.write().await;
        // 双重检查：等写锁期间其他任务可能已刷新
        if let Some(token) = guard.usable(now) {
            return Ok(token);
        }

        #[derive(Deserialize)]
        struct TokenResp {
            #[serde(default)]
            access_token: String,
            #[serde(default)]
            expires_in: i64,
            #[serde(default)]
            errcode: i64,
            #[serde(default)]
            errmsg: String,
        }

        let resp: TokenResp = self
            .client
            .post(&self.cfg.stable_token_endpoint)
            .json(&serde_json::json!({
                "grant_type": "client_credential",
                "appid": self.cfg.app_id,
                "secret": self.cfg.app_secret,
            }))
            .send()
            .await
            .map_err(|e| AppError::Network(format!("获取接口调用凭证失败: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::Json(format!("解析接口调用凭证响应失败: {e}")))?;

        if resp.errcode != 0 || resp.access_token.is_empty() {
            return Err(AppError::Network(format!(
                "获取接口调用凭证失败: errcode={} errmsg={}",
                resp.errcode, resp.errmsg
            )));
        }

        let slack = 300.min(resp.expires_in / 2);
        guard.token = resp.access_token.clone();
        guard.expires_at = Some(now + ChronoDuration::seconds(resp.expires_in - slack));
        Ok(resp.access_token)
    }

    /// 获取小程序二维码，适用于需要的码数量较少的业务场景。
    pub async fn create_qr_code(&self, args: &QrCodeArgs) -> Result<(Vec<u8>, String), AppError> {
        let endpoint = self.cfg.create_qrcode_endpoint.clone();
        let body = serde_json::to_value(args)?;
        self.fetch_code_image(&endpoint, body).await
    }

    /// 获取小程序码，适用于需要的码数量较少的业务场景。
    pub async fn get_wxa_code(&self, args: &WxaCodeArgs) -> Result<(Vec<u8>, String), AppError> {
        let endpoint = self.cfg.wxacode_endpoint.clone();
        let body = serde_json::to_value(args)?;
        self.fetch_code_image(&endpoint, body).await
    }

    /// 获取小程序码，适用于需要的码数量极多的业务场景（scene 携带参数）。
    pub async fn get_unlimited_wxa_code(
        &self,
        args: &UnlimitedWxaCodeArgs,
    ) -> Result<(Vec<u8>, String), AppError> {
        let endpoint = self.cfg.wxacode_unlimited_endpoint.clone();
        let body = serde_json::to_value(args)?;
        self.fetch_code_image(&endpoint, body).await
    }

    /// 小程序码接口的公共请求路径。
    ///
    /// 微信的约定：成功直接返回图片字节流，失败返回 JSON（errcode/errmsg），
    /// 两者都走 HTTP 200，只能靠 Content-Type 区分。
    async fn fetch_code_image(
        &self,
        endpoint: &str,
        body: Value,
    ) -> Result<(Vec<u8>, String), AppError> {
        let token = self.access_token().await?;

        let resp = self
            .client
            .post(endpoint)
            .query(&[("access_token", token.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("小程序码请求失败: {e}")))?;

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| AppError::Network(format!("读取小程序码响应失败: {e}")))?;

        if content_type.contains("json") || content_type.contains("text/plain") {
            let v: Value = serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
            let errcode = v.get("errcode").and_then(Value::as_i64).unwrap_or(-1);
            let errmsg = v
                .get("errmsg")
                .and_then(Value::as_str)
                .unwrap_or("未知错误");
            return Err(AppError::Network(format!(
                "微信小程序码接口错误: errcode={errcode} errmsg={errmsg}"
            )));
        }

        Ok((bytes.to_vec(), content_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::BlockEncryptMut;

    type Aes128CbcEnc = cbc::Encryptor<Aes128>;

    fn encrypt_fixture(plaintext: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> String {
        let enc = Aes128CbcEnc::new_from_slices(key, iv).unwrap();
        BASE64.encode(enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
    }

    #[test]
    fn decrypt_data_roundtrip_recovers_phone_payload() {
        let key = *b"0123456789abcdef";
        let iv = *b"fedcba9876543210";
        let plaintext = br#"{"phoneNumber":"13800138000"}"#;

        let encrypted = encrypt_fixture(plaintext, &key, &iv);
        let decrypted = WechatClient::decrypt_data(
            &encrypted,
            &BASE64.encode(key),
            &BASE64.encode(iv),
        )
        .unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn decrypt_data_rejects_bad_base64() {
        let err = WechatClient::decrypt_data("!!not base64!!", "a2V5", "aXY=").unwrap_err();
        assert_eq!(err.stable_code(), "DECRYPT_FAILED");
    }

    #[test]
    fn decrypt_data_rejects_wrong_key_length() {
        let key = BASE64.encode(b"short");
        let iv = BASE64.encode(b"fedcba9876543210");
        let data = BASE64.encode([0u8; 16]);
        let err = WechatClient::decrypt_data(&data, &key, &iv).unwrap_err();
        assert_eq!(err.stable_code(), "DECRYPT_FAILED");
    }

    #[test]
    fn decrypt_data_rejects_truncated_ciphertext() {
        let key = *b"0123456789abcdef";
        let iv = *b"fedcba9876543210";
        // 密文长度不是分组对齐的，CBC 解密必然失败
        let truncated = BASE64.encode([0x5au8; 15]);
        let err = WechatClient::decrypt_data(
            &truncated,
            &BASE64.encode(key),
            &BASE64.encode(iv),
        )
        .unwrap_err();
        assert_eq!(err.stable_code(), "DECRYPT_FAILED");
    }
}
