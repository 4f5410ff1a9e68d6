use axum::{
    async_trait,
    extract::{FromRequest, Request, rejection::JsonRejection},
};

use crate::error::AppError;

/// `axum::Json` 的替身：请求体缺字段或不是合法 JSON 时，
/// 拒绝响应走统一的参数校验错误（problem+json），
/// 而不是 axum 默认的 text/plain 报文。
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError::Validation(format!(
                "请求体不合法: {}",
                rejection.body_text()
            ))),
        }
    }
}
