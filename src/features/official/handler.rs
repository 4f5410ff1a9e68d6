use axum::{
    Router,
    extract::{Query, State},
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::config::OfficialConfig;
use crate::error::AppError;
use crate::state::AppState;

use super::events::SubscribeEvent;

/// 微信服务器带在回调 URL 上的校验参数
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub echostr: String,
}

/// 校验微信回调签名：SHA1(sort(token, timestamp, nonce))。
pub fn verify_signature(token: &str, query: &CallbackQuery) -> bool {
    let mut parts = [token, query.timestamp.as_str(), query.nonce.as_str()];
    parts.sort_unstable();
    let mut hasher = Sha1::new();
    for p in parts {
        hasher.update(p.as_bytes());
    }
    hex::encode(hasher.finalize()) == query.signature
}

fn ensure_official_enabled(cfg: &OfficialConfig) -> Result<(), AppError> {
    if !cfg.enabled() {
        return Err(AppError::NotFound("公众号回调未启用".to_string()));
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/official/callback",
    summary = "公众号服务器地址校验",
    description = "微信配置服务器地址时的一次性 echostr 校验。签名合法原样返回 echostr。",
    params(
        ("signature" = String, Query, description = "微信加密签名"),
        ("timestamp" = String, Query, description = "时间戳"),
        ("nonce" = String, Query, description = "随机数"),
        ("echostr" = String, Query, description = "随机字符串，校验通过后原样返回")
    ),
    responses(
        (status = 200, description = "校验通过，返回 echostr"),
        (status = 403, description = "签名不合法", body = crate::error::ProblemDetails)
    ),
    tag = "Official"
)]
pub async fn get_callback_verify(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<String, AppError> {
    ensure_official_enabled(&state.official)?;
    if !verify_signature(&state.official.message_token, &query) {
        return Err(AppError::Forbidden("回调签名不合法".to_string()));
    }
    Ok(query.echostr)
}

#[utoipa::path(
    post,
    path = "/official/callback",
    summary = "公众号事件接收",
    description = "接收明文模式的事件推送（关注/取关），同步分发到注入的事件能力集。\
                   按微信协议固定回复 success。",
    responses(
        (status = 200, description = "已受理"),
        (status = 403, description = "签名不合法", body = crate::error::ProblemDetails)
    ),
    tag = "Official"
)]
pub async fn post_callback_event(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    body: String,
) -> Result<String, AppError> {
    ensure_official_enabled(&state.official)?;
    if !verify_signature(&state.official.message_token, &query) {
        return Err(AppError::Forbidden("回调签名不合法".to_string()));
    }

    let event: SubscribeEvent = serde_xml_rs::from_str(&body)
        .map_err(|e| AppError::Validation(format!("事件报文解析失败: {e}")))?;

    if event.msg_type == "event" {
        match event.event.as_deref() {
            Some("subscribe") => state.official_hooks.on_subscribe(&event)?,
            Some("unsubscribe") => state.official_hooks.on_unsubscribe(&event)?,
            other => {
                tracing::debug!(event = ?other, "忽略未订阅的公众号事件类型");
            }
        }
    }

    // 微信要求 5 秒内回复，无消息体时固定回复 success
    Ok("success".to_string())
}

/// 主动推送指令的对外形态
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PushResponse {
    pub to_users: Vec<String>,
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/official/push",
    summary = "触发一次主动推送",
    description = "调用注入的推送能力，返回要推送的用户与消息内容。",
    responses(
        (status = 200, description = "推送指令", body = PushResponse)
    ),
    tag = "Official"
)]
pub async fn post_push(State(state): State<AppState>) -> Result<Json<PushResponse>, AppError> {
    ensure_official_enabled(&state.official)?;
    let directive = state.official_hooks.on_push()?;
    Ok(Json(PushResponse {
        to_users: directive.to_users,
        message: directive.message,
    }))
}

pub fn create_official_router() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/callback", get(get_callback_verify).post(post_callback_event))
        .route("/push", post(post_push))
}
