//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为导航内核对外暴露的错误语义提供集中定义：路由树解析失败、组件工厂失败、
//!   生命周期钩子异常、视口登记冲突等均在此归档；
//! - 错误会沿导航 Promise（completion channel）回传给 `Router::load` 的调用方，
//!   因此必须可克隆、可比较，便于事件流与断言复用同一份实例。
//!
//! ## 设计要求（What）
//! - 所有错误类型实现 `thiserror::Error`，与 `std::error::Error` 生态兼容；
//! - 细粒度枚举携带可读上下文（视口名、组件名、指令文本），支撑精确告警；
//! - 守卫拒绝（cancel/redirect）**不是**错误：它们通过 `GuardVerdict` 走取消/重定向
//!   路径，本模块只覆盖真正的异常。
//!
//! ## 扩展建议（How）
//! - 非法状态跃迁不在此建模：流水线顺序被破坏属于引擎缺陷，由
//!   `viewport::unexpected_state` 直接 fail-fast，不提供恢复路径。

use thiserror::Error;

/// 导航内核错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：聚合解析、实例化、钩子执行等关键路径的异常，并沿导航结果
///   通道与事件流向外传播；细粒度变体帮助上层快速定位故障来源。
/// - **契约 (What)**：
///   - 所有变体均满足 `Send + Sync + 'static`，可安全跨线程传播；
///   - 实现 `Clone`/`Eq`，同一错误可同时进入 `Transition` 记录、事件流与 Promise；
/// - **设计权衡 (Trade-offs)**：使用 `String` 保存上下文，牺牲少量堆分配换取易读性；
///   若未来需要保留原始错误链，可增加 `Arc<dyn Error>` 载荷变体。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum HelmError {
    /// 路由树解析器无法将指令匹配到任何组件。
    ///
    /// - **意图 (Why)**：在任何视口流水线启动之前拦截无效导航请求；
    /// - **契约 (What)**：`instruction` 为无法匹配的指令文本，`reason` 来自解析器。
    #[error("route resolution failed for `{instruction}`: {reason}")]
    Unresolvable { instruction: String, reason: String },

    /// 组件工厂无法实例化目标组件。
    #[error("component factory failed for `{component}`: {reason}")]
    Factory { component: String, reason: String },

    /// 生命周期钩子抛出或其异步结果被拒绝。
    ///
    /// - **意图 (Why)**：单个钩子失败即终止整条在途导航（见 `Transition::handle_error`）；
    /// - **契约 (What)**：`hook` 为失败的钩子名（如 `canLoad`），`component` 为宿主组件。
    #[error("lifecycle hook `{hook}` failed on `{component}`: {reason}")]
    Hook {
        component: String,
        hook: &'static str,
        reason: String,
    },

    /// 指令树引用了目标上下文中不存在的视口。
    #[error("no viewport named `{viewport}` registered in context `{context}`")]
    ViewportNotFound { viewport: String, context: String },

    /// 同名视口在同一上下文中重复登记。
    ///
    /// - **风险 (Trade-offs)**：出现该错误通常意味着宿主层 attach/detach 顺序失衡，
    ///   需要排查包装元素的生命周期调用。
    #[error("viewport `{viewport}` already registered in context `{context}`")]
    ViewportAlreadyRegistered { viewport: String, context: String },

    /// `Router::load` 收到裸路径但未配置指令解析器。
    #[error("no instruction parser configured; cannot load path `{path}`")]
    ParserMissing { path: String },

    /// 导航结果通道意外关闭。
    ///
    /// - **意图 (Why)**：兜底变体；正常流程下每个 Transition 的 senders 都会被
    ///   resolve/reject 或转移给后继 Transition，不应出现。
    #[error("navigation completion channel dropped before settling")]
    CompletionDropped,
}
