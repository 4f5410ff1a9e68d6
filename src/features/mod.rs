/// 微信小程序：登录与小程序码
pub mod wechat;

/// 公众号：回调校验与事件分发
pub mod official;

/// 用户持久化
pub mod user;

/// 访问令牌签发
pub mod token;

/// IP 归属地解析
pub mod geo;
