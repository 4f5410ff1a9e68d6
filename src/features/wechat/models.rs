use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// code2session 的交换结果。
///
/// 微信对该接口的错误不走 HTTP 状态码：成功与失败都是 200，
/// 以 `errcode` 区分（缺省视为 0，即成功）。
#[derive(Deserialize, Clone)]
pub struct Session {
    #[serde(default, rename = "openid")]
    pub open_id: String,
    #[serde(default)]
    pub session_key: String,
    #[serde(default, rename = "unionid")]
    pub union_id: String,
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
}

impl std::fmt::Debug for Session {
    // session_key 是一次性密钥，不进日志
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("open_id", &self.open_id)
            .field("union_id", &self.union_id)
            .field("session_key", &"********")
            .field("errcode", &self.errcode)
            .finish()
    }
}

/// 解密后的手机号载荷（只关心 phoneNumber 字段）
#[derive(Debug, Deserialize)]
pub struct PhonePayload {
    #[serde(default, rename = "phoneNumber")]
    pub phone_number: String,
}

/// 登录请求体
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    /// 小程序端 wx.login() 取得的一次性授权码
    pub code: String,
    /// 手机号授权的加密数据（可选）
    #[serde(default)]
    pub encrypted_data: Option<String>,
    /// 加密数据对应的初始向量（可选）
    #[serde(default)]
    pub iv_str: Option<String>,
}

/// 登录成功响应：要么是“首次触达、未授权手机号”的裸 OpenID，
/// 要么是令牌服务产出的访问令牌载荷。
#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum LoginResponse {
    /// 未注册且未授权手机号：只回 open_id，不建档
    OpenIdOnly {
        #[schema(example = "oGZUI0egBJY1zhBYw2KhdUfwVJJE")]
        open_id: String,
    },
    /// 已注册或本次完成注册：返回访问令牌
    Token(crate::features::token::TokenPayload),
}

/// 小程序码线条颜色（RGB）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct LineColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// 要打开的小程序版本
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EnvVersion {
    /// 正式版
    #[default]
    Release,
    /// 体验版
    Trial,
    /// 开发版
    Develop,
}

/// 小程序二维码参数（cgi-bin/wxaapp/createwxaqrcode，数量有限）
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QrCodeArgs {
    /// 扫码进入的小程序页面路径，可携带 query 参数，最大 1024 字符
    pub path: String,
    /// 二维码宽度（px），缺省由微信决定（430）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
}

/// 小程序码参数（wxa/getwxacode，数量有限）
///
/// 原实现是链式 setter 的参数对象；这里按字段直接建模，
/// 可选项即 Option，无行为逻辑。
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WxaCodeArgs {
    /// 扫码进入的小程序页面路径，可携带 query 参数
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
    /// 自动配置线条颜色；开启时 line_color 失效
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_color: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_color: Option<LineColor>,
    /// 是否透明底色
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_hyaline: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_version: Option<EnvVersion>,
}

/// 小程序码参数（wxa/getwxacodeunlimit，数量不限）
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UnlimitedWxaCodeArgs {
    /// 携带的业务参数，最大 32 个可见字符
    pub scene: String,
    /// 默认跳主页面，可指定已发布页面
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    /// 是否校验 page 必须为已发布页面
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_path: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_color: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_color: Option<LineColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_hyaline: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_version: Option<EnvVersion>,
}
