use serde::Deserialize;

use crate::error::AppError;

/// 公众号推送的关注/取关事件（明文模式 XML 反序列化后的形态）。
///
/// 字段名对应微信报文里的 PascalCase 标签。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubscribeEvent {
    /// 公众号微信号
    pub to_user_name: String,
    /// 事件发起用户的 OpenID
    pub from_user_name: String,
    pub create_time: i64,
    pub msg_type: String,
    /// subscribe / unsubscribe / 其它事件
    #[serde(default)]
    pub event: Option<String>,
    /// 扫带参二维码关注时携带
    #[serde(default)]
    pub event_key: Option<String>,
}

/// 主动推送的指令：把 message 发给 to_users。
#[derive(Debug, Clone, Default)]
pub struct PushDirective {
    pub to_users: Vec<String>,
    pub message: String,
}

/// 公众号事件能力集。
///
/// 启动时注入一份实现，事件到达后同步分发；
/// 三个方法对应关注、取关与主动推送三种能力。
pub trait OfficialEventHooks: Send + Sync {
    /// 用户关注
    fn on_subscribe(&self, event: &SubscribeEvent) -> Result<(), AppError>;
    /// 用户取关
    fn on_unsubscribe(&self, event: &SubscribeEvent) -> Result<(), AppError>;
    /// 产出一次主动推送
    fn on_push(&self) -> Result<PushDirective, AppError>;
}

/// 缺省实现：只记日志，不做业务动作。
pub struct LoggingEventHooks;

impl OfficialEventHooks for LoggingEventHooks {
    fn on_subscribe(&self, event: &SubscribeEvent) -> Result<(), AppError> {
        tracing::info!(open_id = %event.from_user_name, "公众号新增关注");
        Ok(())
    }

    fn on_unsubscribe(&self, event: &SubscribeEvent) -> Result<(), AppError> {
        tracing::info!(open_id = %event.from_user_name, "公众号取消关注");
        Ok(())
    }

    fn on_push(&self) -> Result<PushDirective, AppError> {
        Ok(PushDirective::default())
    }
}
