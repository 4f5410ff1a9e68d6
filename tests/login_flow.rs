//! 小程序登录流程的契约测试。
//!
//! 不触网：code2session 与归属地查询都指向本地 mock，
//! 数据库使用每个用例独立的临时 SQLite 文件。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use aes::Aes128;
use aes::cipher::{BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use uuid::Uuid;

use wx_bridge::config::{GeoConfig, OfficialConfig, SessionTokenConfig, WechatConfig};
use wx_bridge::extract::ValidatedJson;
use wx_bridge::features::geo::GeoClient;
use wx_bridge::features::official::events::LoggingEventHooks;
use wx_bridge::features::token::TokenService;
use wx_bridge::features::user::UserStore;
use wx_bridge::features::wechat::client::WechatClient;
use wx_bridge::features::wechat::handler::post_login;
use wx_bridge::features::wechat::models::{LoginRequest, LoginResponse};
use wx_bridge::state::AppState;

/// 所有用例共用的会话密钥（16 字节，AES-128）
const SESSION_KEY: &[u8; 16] = b"0123456789abcdef";
const IV: &[u8; 16] = b"fedcba9876543210";

type Aes128CbcEnc = cbc::Encryptor<Aes128>;

fn encrypt_payload(plaintext: &[u8]) -> String {
    let enc = Aes128CbcEnc::new_from_slices(SESSION_KEY, IV).unwrap();
    BASE64.encode(enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

async fn mock_jscode2session(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let code = params.get("js_code").cloned().unwrap_or_default();
    if code == "bad-code" {
        return Json(json!({"errcode": 40029, "errmsg": "invalid code"}));
    }
    Json(json!({
        "openid": format!("open-{code}"),
        "unionid": format!("union-{code}"),
        "session_key": BASE64.encode(SESSION_KEY),
    }))
}

async fn mock_loc(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let ip = params.get("ip").cloned().unwrap_or_default();
    Json(json!({"ip": ip, "adCode": "310104"}))
}

/// 启动本地 mock 微信/归属地服务，返回监听地址。
async fn spawn_mock_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/sns/jscode2session", get(mock_jscode2session))
        .route("/loc", get(mock_loc));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock server");
    });
    addr
}

fn wechat_config(mock: SocketAddr) -> WechatConfig {
    WechatConfig {
        app_id: "wx-test-app".to_string(),
        app_secret: "wx-test-secret".to_string(),
        jscode2session_endpoint: format!("http://{mock}/sns/jscode2session"),
        ..Default::default()
    }
}

async fn make_store() -> UserStore {
    let db_path = std::env::temp_dir().join(format!("wx_bridge_login_{}.db", Uuid::new_v4()));
    let store = UserStore::connect_sqlite(db_path.to_str().unwrap(), true)
        .await
        .expect("connect sqlite");
    store.init_schema().await.expect("init schema");
    store
}

/// geo_reachable=false 时归属地端点指向不可达地址，解析必然失败。
async fn make_state(mock: SocketAddr, geo_reachable: bool) -> AppState {
    let geo_endpoint = if geo_reachable {
        format!("http://{mock}/loc")
    } else {
        "http://127.0.0.1:1/loc".to_string()
    };
    AppState {
        wechat: Arc::new(WechatClient::new(&wechat_config(mock)).expect("wechat client")),
        users: Arc::new(make_store().await),
        tokens: Arc::new(TokenService::new(&SessionTokenConfig {
            jwt_secret: "integration-test-secret".to_string(),
            ..Default::default()
        })),
        geo: Arc::new(GeoClient::new(&GeoConfig {
            endpoint: geo_endpoint,
            timeout_secs: 1,
        })),
        official: OfficialConfig::default(),
        official_hooks: Arc::new(LoggingEventHooks),
    }
}

fn login_request(code: &str, encrypted: Option<String>, iv: Option<String>) -> LoginRequest {
    LoginRequest {
        code: code.to_string(),
        encrypted_data: encrypted,
        iv_str: iv,
    }
}

async fn call_login(
    state: &AppState,
    req: LoginRequest,
) -> Result<LoginResponse, wx_bridge::AppError> {
    post_login(State(state.clone()), HeaderMap::new(), None, ValidatedJson(req))
        .await
        .map(|Json(resp)| resp)
}

async fn count_users(state: &AppState) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(&state.users.pool)
        .await
        .expect("count users")
}

#[tokio::test]
async fn empty_code_is_rejected_before_any_upstream_call() {
    // 端点统统不可达：若流程在校验前发起外部调用，错误种类会变成 WECHAT_AUTH_FAILED
    let unreachable: SocketAddr = "127.0.0.1:1".parse().unwrap();
    let state = make_state(unreachable, false).await;

    let err = call_login(&state, login_request("   ", None, None))
        .await
        .unwrap_err();
    assert_eq!(err.stable_code(), "INVALID_PARAM");
    assert_eq!(count_users(&state).await, 0);
}

#[tokio::test]
async fn nonzero_errcode_surfaces_as_wechat_auth_failure() {
    let mock = spawn_mock_upstream().await;
    let state = make_state(mock, false).await;

    let err = call_login(&state, login_request("bad-code", None, None))
        .await
        .unwrap_err();
    assert_eq!(err.stable_code(), "WECHAT_AUTH_FAILED");
    // 会话交换失败后不允许触达持久层
    assert_eq!(count_users(&state).await, 0);
}

#[tokio::test]
async fn first_touch_without_phone_grant_returns_open_id_only() {
    let mock = spawn_mock_upstream().await;
    let state = make_state(mock, false).await;

    let resp = call_login(&state, login_request("c1", None, None))
        .await
        .unwrap();
    match resp {
        LoginResponse::OpenIdOnly { open_id } => assert_eq!(open_id, "open-c1"),
        other => panic!("期望只返回 open_id，实际: {other:?}"),
    }
    assert_eq!(count_users(&state).await, 0);
}

#[tokio::test]
async fn first_login_with_phone_grant_creates_user_and_issues_token() {
    let mock = spawn_mock_upstream().await;
    let state = make_state(mock, false).await;

    let encrypted = encrypt_payload(br#"{"phoneNumber":"13800138000"}"#);
    let resp = call_login(
        &state,
        login_request("c2", Some(encrypted), Some(BASE64.encode(IV))),
    )
    .await
    .unwrap();

    match resp {
        LoginResponse::Token(payload) => {
            assert_eq!(payload.token_type, "Bearer");
            assert!(!payload.access_token.is_empty());
        }
        other => panic!("期望返回令牌，实际: {other:?}"),
    }

    assert_eq!(count_users(&state).await, 1);
    let user = state
        .users
        .find_by_union_id("union-c2")
        .await
        .unwrap()
        .expect("user created");
    assert_eq!(user.phone, "13800138000");
    assert_eq!(user.open_id, "open-c2");
    // 归属地端点不可达：area_code 必须是哨兵 "0"，且不影响建档
    assert_eq!(user.area_code, "0");
}

#[tokio::test]
async fn reachable_geo_service_fills_area_code() {
    let mock = spawn_mock_upstream().await;
    let state = make_state(mock, true).await;

    let mut headers = HeaderMap::new();
    headers.insert("x-forwarded-for", "203.0.113.9".parse().unwrap());

    let encrypted = encrypt_payload(br#"{"phoneNumber":"13900139000"}"#);
    let req = login_request("c3", Some(encrypted), Some(BASE64.encode(IV)));
    post_login(State(state.clone()), headers, None, ValidatedJson(req))
        .await
        .unwrap();

    let user = state
        .users
        .find_by_union_id("union-c3")
        .await
        .unwrap()
        .expect("user created");
    assert_eq!(user.area_code, "310104");
    assert_eq!(user.client_ip, "203.0.113.9");
}

#[tokio::test]
async fn registered_user_never_triggers_decryption() {
    let mock = spawn_mock_upstream().await;
    let state = make_state(mock, false).await;

    // 先完成一次带手机号授权的注册
    let encrypted = encrypt_payload(br#"{"phoneNumber":"13700137000"}"#);
    call_login(
        &state,
        login_request("c4", Some(encrypted), Some(BASE64.encode(IV))),
    )
    .await
    .unwrap();
    assert_eq!(count_users(&state).await, 1);

    // 再次登录携带非法密文：若走了解密分支必然报 DECRYPT_FAILED
    let resp = call_login(
        &state,
        login_request("c4", Some("!!not base64!!".to_string()), Some("!!".to_string())),
    )
    .await
    .unwrap();
    assert!(matches!(resp, LoginResponse::Token(_)));
    assert_eq!(count_users(&state).await, 1);
}

#[tokio::test]
async fn malformed_decrypted_payload_is_decrypt_error() {
    let mock = spawn_mock_upstream().await;
    let state = make_state(mock, false).await;

    // 密文合法、解密成功，但明文不是 JSON
    let encrypted = encrypt_payload(b"plain text, not json");
    let err = call_login(
        &state,
        login_request("c5", Some(encrypted), Some(BASE64.encode(IV))),
    )
    .await
    .unwrap_err();
    assert_eq!(err.stable_code(), "DECRYPT_FAILED");
    assert_eq!(count_users(&state).await, 0);
}

#[tokio::test]
async fn empty_phone_number_is_decrypt_error() {
    let mock = spawn_mock_upstream().await;
    let state = make_state(mock, false).await;

    let encrypted = encrypt_payload(br#"{"phoneNumber":""}"#);
    let err = call_login(
        &state,
        login_request("c6", Some(encrypted), Some(BASE64.encode(IV))),
    )
    .await
    .unwrap_err();
    assert_eq!(err.stable_code(), "DECRYPT_FAILED");
    assert_eq!(count_users(&state).await, 0);
}
