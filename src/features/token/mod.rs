use jsonwebtoken::{Algorithm, EncodingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::SessionTokenConfig;
use crate::error::AppError;
use crate::features::user::UserRecord;

/// 访问令牌的声明集。
///
/// `skf` 是会话密钥的 SHA-256 指纹前缀：令牌与产生它的那次登录可关联，
/// 而密钥本身不出本次请求。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub uid: i64,
    pub jti: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub skf: String,
}

/// 返回给小程序端的令牌载荷
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenPayload {
    /// JWT 访问令牌
    pub access_token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
    /// 有效期（秒）
    pub expires_in: u64,
    /// 本地用户 ID
    pub user_id: i64,
}

/// 令牌签发服务（HS256 JWT）
#[derive(Clone)]
pub struct TokenService {
    cfg: SessionTokenConfig,
}

impl TokenService {
    pub fn new(cfg: &SessionTokenConfig) -> Self {
        Self { cfg: cfg.clone() }
    }

    fn resolve_secret(&self) -> Result<String, AppError> {
        if !self.cfg.jwt_secret.trim().is_empty() {
            return Ok(self.cfg.jwt_secret.clone());
        }
        let from_env = std::env::var("APP_SESSION_JWT_SECRET").unwrap_or_default();
        if !from_env.trim().is_empty() {
            return Ok(from_env);
        }
        Err(AppError::Token(
            "session.jwt_secret 未配置（可通过 APP_SESSION_JWT_SECRET 设置）".to_string(),
        ))
    }

    /// 由用户档案与本次登录的会话密钥签发访问令牌。
    pub fn generate(
        &self,
        user: &UserRecord,
        session_key: &str,
    ) -> Result<TokenPayload, AppError> {
        let now = chrono::Utc::now().timestamp();
        let ttl = self.cfg.ttl_secs.max(300);
        let claims = AccessClaims {
            sub: user.union_id.clone(),
            uid: user.id,
            jti: Uuid::new_v4().to_string(),
            iss: self.cfg.jwt_issuer.clone(),
            aud: self.cfg.jwt_audience.clone(),
            iat: now,
            exp: now + ttl as i64,
            skf: session_key_fingerprint(session_key),
        };
        let secret = self.resolve_secret()?;
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| AppError::Token(format!("签发访问令牌失败: {e}")))?;

        Ok(TokenPayload {
            access_token: token,
            token_type: "Bearer".to_string(),
            expires_in: ttl,
            user_id: user.id,
        })
    }
}

fn session_key_fingerprint(session_key: &str) -> String {
    let digest = Sha256::digest(session_key.as_bytes());
    hex::encode(&digest[..8])
}
