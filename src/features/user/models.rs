use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

/// 本地用户档案，按 UnionID 唯一。
///
/// 首次授权手机号登录时懒创建，之后只读。
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct UserRecord {
    pub id: i64,
    /// 授权得到的手机号
    pub phone: String,
    /// 跨应用稳定的微信用户标识
    pub union_id: String,
    /// 当前小程序内的用户标识
    pub open_id: String,
    /// 注册时按客户端 IP 解析的行政区划代码，解析失败为 "0"
    pub area_code: String,
    /// 注册时的客户端 IP
    pub client_ip: String,
    /// 创建时间（RFC3339，UTC）
    pub created_at: String,
}
