use std::sync::Arc;

use crate::config::OfficialConfig;
use crate::features::geo::GeoClient;
use crate::features::official::events::OfficialEventHooks;
use crate::features::token::TokenService;
use crate::features::user::UserStore;
use crate::features::wechat::client::WechatClient;

/// 聚合的应用共享状态。
///
/// 启动时显式构造并注入各协作方，请求处理器不触碰任何进程级可变单例。
#[derive(Clone)]
pub struct AppState {
    pub wechat: Arc<WechatClient>,
    pub users: Arc<UserStore>,
    pub tokens: Arc<TokenService>,
    pub geo: Arc<GeoClient>,
    /// 公众号回调配置（token 为空时整个回调面不可用）
    pub official: OfficialConfig,
    /// 公众号事件能力集，配置期注入
    pub official_hooks: Arc<dyn OfficialEventHooks>,
}
