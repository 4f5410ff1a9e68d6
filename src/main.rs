use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, http::StatusCode, response::Json, routing::get};
use serde_json::json;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use wx_bridge::config::AppConfig;
use wx_bridge::error::{AppError, ProblemDetails};
use wx_bridge::features::geo::GeoClient;
use wx_bridge::features::official::{self, events::LoggingEventHooks};
use wx_bridge::features::token::TokenService;
use wx_bridge::features::user::UserStore;
use wx_bridge::features::wechat::{self, client::WechatClient};
use wx_bridge::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        wx_bridge::features::wechat::handler::post_login,
        wx_bridge::features::wechat::handler::post_qrcode,
        wx_bridge::features::wechat::handler::post_wxa_code,
        wx_bridge::features::wechat::handler::post_unlimited_wxa_code,
        wx_bridge::features::official::handler::get_callback_verify,
        wx_bridge::features::official::handler::post_callback_event,
        wx_bridge::features::official::handler::post_push,
        health_check,
    ),
    components(
        schemas(
            AppError,
            ProblemDetails,
            wx_bridge::features::wechat::models::LoginRequest,
            wx_bridge::features::wechat::models::LoginResponse,
            wx_bridge::features::wechat::models::QrCodeArgs,
            wx_bridge::features::wechat::models::WxaCodeArgs,
            wx_bridge::features::wechat::models::UnlimitedWxaCodeArgs,
            wx_bridge::features::wechat::models::LineColor,
            wx_bridge::features::wechat::models::EnvVersion,
            wx_bridge::features::token::TokenPayload,
            wx_bridge::features::official::handler::PushResponse,
        )
    ),
    tags(
        (name = "Wx", description = "小程序登录与小程序码"),
        (name = "Official", description = "公众号回调"),
        (name = "Health", description = "健康检查"),
    ),
    info(
        title = "WX Bridge API",
        version = "0.1.0",
        description = "WeChat mini-program bridge service (Axum)"
    )
)]
pub struct ApiDoc;

#[utoipa::path(
    get,
    path = "/health",
    summary = "健康检查",
    description = "用于探活的健康检查端点，返回服务状态与版本信息。",
    responses((status = 200, description = "服务健康", body = serde_json::Value)),
    tag = "Health"
)]
async fn health_check() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "wx-bridge",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// 等待 ctrl-c 或 SIGTERM，触发 axum 的优雅退出。
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("安装 ctrl-c 信号处理器失败");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("安装 SIGTERM 信号处理器失败")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("接收到退出信号，开始优雅关闭 HTTP 服务器...");
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wx_bridge=info,tower_http=info".into()),
        )
        .init();

    // Load config
    if let Err(e) = AppConfig::init_global() {
        tracing::error!("Config init failed: {}", e);
        std::process::exit(1);
    }
    let config = AppConfig::global();

    // 用户库：连接 + 建表
    let users = match UserStore::connect_sqlite(&config.database.path, config.database.wal).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("SQLite 连接失败: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = users.init_schema().await {
        tracing::error!("初始化数据库失败: {}", e);
        std::process::exit(1);
    }

    // 微信客户端
    let wechat_client = match WechatClient::new(&config.wechat) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!("微信客户端初始化失败: {}", e);
            std::process::exit(1);
        }
    };

    // Shared state：协作方在这里一次性注入
    let app_state = AppState {
        wechat: wechat_client,
        users: Arc::new(users),
        tokens: Arc::new(TokenService::new(&config.session)),
        geo: Arc::new(GeoClient::new(&config.geo)),
        official: config.official.clone(),
        official_hooks: Arc::new(LoggingEventHooks),
    };

    // Routes
    let api_router = Router::<AppState>::new()
        .nest("/wx", wechat::create_wx_router())
        .nest("/official", official::create_official_router());

    let app = Router::<AppState>::new()
        .route("/health", get(health_check))
        .nest(&config.api.prefix, api_router)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(app_state)
        .layer(axum::middleware::from_fn(
            wx_bridge::request_id::request_id_middleware,
        ))
        .layer(TraceLayer::new_for_http());

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Bind address failed {}: {}", addr, e);
            std::process::exit(1);
        });

    tracing::info!("Server: http://{}", addr);
    tracing::info!("Docs: http://{}/docs", addr);
    tracing::info!("Login API: http://{}{}/wx/login", addr, config.api.prefix);
    if config.official.enabled() {
        tracing::info!(
            "Official callback: http://{}{}/official/callback",
            addr,
            config.api.prefix
        );
    }

    let graceful = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    if let Err(e) = graceful.await {
        tracing::error!("服务器运行错误: {}", e);
        std::process::exit(1);
    }

    tracing::info!("服务器已优雅关闭");
}
