use std::net::SocketAddr;

use axum::{
    Router,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::post,
};

use crate::error::AppError;
use crate::extract::ValidatedJson;
use crate::features::user::NewUser;
use crate::state::AppState;

use super::client::WechatClient;
use super::models::{
    LoginRequest, LoginResponse, PhonePayload, QrCodeArgs, UnlimitedWxaCodeArgs, WxaCodeArgs,
};

/// 取客户端 IP：优先代理头，缺省回退到 TCP 对端地址。
fn client_ip(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> String {
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next().map(str::trim))
        && !ip.is_empty()
    {
        return ip.to_string();
    }
    if let Some(v) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let s = v.trim();
        if !s.is_empty() {
            return s.to_string();
        }
    }
    connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}

#[utoipa::path(
    post,
    path = "/wx/login",
    summary = "小程序登录",
    description = "用 wx.login() 的授权码换取会话。未注册且未授权手机号只返回 open_id；\
                   已注册或携带手机号授权数据完成注册后返回访问令牌。",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "登录成功（open_id 或访问令牌）", body = LoginResponse),
        (status = 422, description = "参数缺失或解密失败", body = crate::error::ProblemDetails),
        (status = 502, description = "微信会话交换失败", body = crate::error::ProblemDetails)
    ),
    tag = "Wx"
)]
pub async fn post_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    // 任何外部调用之前先拒绝空 code
    if req.code.trim().is_empty() {
        return Err(AppError::Validation("code 不能为空".to_string()));
    }

    // 1. 授权码换会话；失败或 errcode != 0 直接终止
    let session = state.wechat.code_to_session(&req.code).await?;

    // 2. 按 UnionID 查档
    let existing = state.users.find_by_union_id(&session.union_id).await?;

    let user = match existing {
        // 3a. 已注册：无论是否携带手机号授权数据，直接发令牌
        Some(user) => user,
        None => {
            let encrypted = req.encrypted_data.as_deref().unwrap_or_default();
            if encrypted.is_empty() {
                // 3b. 首次触达且未授权手机号：只回 open_id，不建档
                return Ok(Json(LoginResponse::OpenIdOnly {
                    open_id: session.open_id,
                }));
            }

            // 4. 解密手机号并建档
            let iv = req.iv_str.as_deref().unwrap_or_default();
            let plaintext = WechatClient::decrypt_data(encrypted, &session.session_key, iv)?;
            // 解密成功但内容非 JSON 或手机号为空，同样归为解密失败（消息可区分）
            let phone: PhonePayload = serde_json::from_slice(&plaintext)
                .map_err(|e| AppError::Decrypt(format!("手机号载荷不是合法 JSON: {e}")))?;
            if phone.phone_number.is_empty() {
                return Err(AppError::Decrypt("手机号载荷为空".to_string()));
            }

            let ip = client_ip(&headers, connect_info.as_ref());
            // 归属地是尽力而为的辅助信息，失败折叠为 "0"
            let area_code = state.geo.resolve_area_code(&ip).await;

            state
                .users
                .create(NewUser {
                    phone: &phone.phone_number,
                    union_id: &session.union_id,
                    open_id: &session.open_id,
                    area_code: &area_code,
                    client_ip: &ip,
                })
                .await?
        }
    };

    // 5. 由用户档案与会话密钥签发访问令牌
    let payload = state.tokens.generate(&user, &session.session_key)?;
    Ok(Json(LoginResponse::Token(payload)))
}

/// 把微信返回的图片字节流原样回给调用方。
fn image_response(bytes: Vec<u8>, content_type: String) -> Response {
    let mut res = bytes.into_response();
    if let Ok(value) = HeaderValue::from_str(&content_type) {
        res.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    *res.status_mut() = StatusCode::OK;
    res
}

#[utoipa::path(
    post,
    path = "/wx/qrcode",
    summary = "小程序二维码（数量有限）",
    request_body = QrCodeArgs,
    responses(
        (status = 200, description = "二维码图片字节流"),
        (status = 502, description = "微信接口错误", body = crate::error::ProblemDetails)
    ),
    tag = "Wx"
)]
pub async fn post_qrcode(
    State(state): State<AppState>,
    ValidatedJson(args): ValidatedJson<QrCodeArgs>,
) -> Result<Response, AppError> {
    if args.path.trim().is_empty() {
        return Err(AppError::Validation("path 不能为空".to_string()));
    }
    let (bytes, content_type) = state.wechat.create_qr_code(&args).await?;
    Ok(image_response(bytes, content_type))
}

#[utoipa::path(
    post,
    path = "/wx/wxacode",
    summary = "小程序码（数量有限）",
    request_body = WxaCodeArgs,
    responses(
        (status = 200, description = "小程序码图片字节流"),
        (status = 502, description = "微信接口错误", body = crate::error::ProblemDetails)
    ),
    tag = "Wx"
)]
pub async fn post_wxa_code(
    State(state): State<AppState>,
    ValidatedJson(args): ValidatedJson<WxaCodeArgs>,
) -> Result<Response, AppError> {
    if args.path.trim().is_empty() {
        return Err(AppError::Validation("path 不能为空".to_string()));
    }
    let (bytes, content_type) = state.wechat.get_wxa_code(&args).await?;
    Ok(image_response(bytes, content_type))
}

#[utoipa::path(
    post,
    path = "/wx/wxacode/unlimited",
    summary = "小程序码（数量不限，scene 携带参数）",
    request_body = UnlimitedWxaCodeArgs,
    responses(
        (status = 200, description = "小程序码图片字节流"),
        (status = 502, description = "微信接口错误", body = crate::error::ProblemDetails)
    ),
    tag = "Wx"
)]
pub async fn post_unlimited_wxa_code(
    State(state): State<AppState>,
    ValidatedJson(args): ValidatedJson<UnlimitedWxaCodeArgs>,
) -> Result<Response, AppError> {
    if args.scene.trim().is_empty() {
        return Err(AppError::Validation("scene 不能为空".to_string()));
    }
    let (bytes, content_type) = state.wechat.get_unlimited_wxa_code(&args).await?;
    Ok(image_response(bytes, content_type))
}

pub fn create_wx_router() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/login", post(post_login))
        .route("/qrcode", post(post_qrcode))
        .route("/wxacode", post(post_wxa_code))
        .route("/wxacode/unlimited", post(post_unlimited_wxa_code))
}

#[cfg(test)]
mod tests {
    use super::client_ip;
    use axum::http::{HeaderMap, HeaderValue};

    #[test]
    fn client_ip_prefers_x_forwarded_for_first_item() {
        let mut h = HeaderMap::new();
        h.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 1.2.3.4 , 5.6.7.8 "),
        );
        h.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(client_ip(&h, None), "1.2.3.4");
    }

    #[test]
    fn client_ip_falls_back_to_x_real_ip_then_empty() {
        let mut h = HeaderMap::new();
        h.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(client_ip(&h, None), "9.9.9.9");

        let empty = HeaderMap::new();
        assert_eq!(client_ip(&empty, None), "");
    }
}
