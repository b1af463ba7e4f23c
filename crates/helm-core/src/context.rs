//! # context 模块：路由上下文与外部接缝
//!
//! ## 核心意图（Why）
//! - 每个承载视口的组件都对应一个 `RouteContext`：它**拥有**登记在其名下的
//!   视口槽（显式注册表，而非以宿主元素为键的环境查找），槽的生命周期由
//!   上下文控制，注销即回收。
//! - 内核消费的四个外部协作者（路由树解析器、组件工厂、指令解析器、历史记录层）
//!   也在此定义窄接缝：内核只依赖这些 trait，不关心其实现细节。
//!
//! ## 行为契约（What）
//! - `register_viewport`：同名槽重复登记返回
//!   [`HelmError::ViewportAlreadyRegistered`]；
//! - `unregister_viewport`：原子移除并交还槽句柄，便于宿主层善后；
//! - 槽查找以视口名为键；指令/节点中的视口名解析失败属于导航错误，
//!   在流水线启动前拦截。

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::HelmError;
use crate::instruction::InstructionTree;
use crate::node::{RouteNode, RouteTree};
use crate::viewport::ViewportSlot;

/// 路由上下文：视口槽的属主注册表。
///
/// # 教案式说明
/// - **意图 (Why)**：把"这个视口对应哪个代理"的查找收敛为显式注册表，
///   槽的存续由上下文拥有，而非依赖垃圾回收时机；
/// - **契约 (What)**：同一上下文内视口名唯一；注册顺序即遍历顺序；
/// - **风险 (Trade-offs)**：注册表以 `Vec` 承载——单个上下文的视口数通常为
///   个位数，顺序语义比哈希查找更有价值。
pub struct RouteContext {
    name: String,
    slots: Mutex<Vec<Arc<ViewportSlot>>>,
}

impl RouteContext {
    /// 创建根上下文。
    pub fn root() -> Arc<Self> {
        Arc::new(Self {
            name: "root".to_owned(),
            slots: Mutex::new(Vec::new()),
        })
    }

    /// 创建挂在某个槽之下的子上下文。
    pub(crate) fn child(name: String) -> Arc<Self> {
        Arc::new(Self {
            name,
            slots: Mutex::new(Vec::new()),
        })
    }

    /// 上下文名（诊断用）。
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 登记一个视口槽。
    ///
    /// # 教案式注释
    /// - **意图 (Why)**：宿主层的视口包装元素 attach 时调用，建立"物理槽位 ↔ 代理"
    ///   的唯一映射；
    /// - **契约 (What)**：
    ///   - **前置条件**：同名槽不应已存在，否则返回 `ViewportAlreadyRegistered`；
    ///   - **后置条件**：返回的槽句柄立即可被导航流水线命中。
    pub fn register_viewport(
        self: &Arc<Self>,
        viewport: impl Into<String>,
    ) -> Result<Arc<ViewportSlot>, HelmError> {
        let viewport = viewport.into();
        let mut slots = self.slots.lock();
        if slots.iter().any(|s| s.viewport_name() == viewport) {
            return Err(HelmError::ViewportAlreadyRegistered {
                viewport,
                context: self.name.clone(),
            });
        }
        let slot = ViewportSlot::new(viewport, self.name.clone());
        slots.push(Arc::clone(&slot));
        Ok(slot)
    }

    /// 注销并交还视口槽；不存在时返回 `None`。
    pub fn unregister_viewport(&self, viewport: &str) -> Option<Arc<ViewportSlot>> {
        let mut slots = self.slots.lock();
        let idx = slots.iter().position(|s| s.viewport_name() == viewport)?;
        Some(slots.remove(idx))
    }

    /// 按名查找槽。
    pub fn slot(&self, viewport: &str) -> Option<Arc<ViewportSlot>> {
        self.slots
            .lock()
            .iter()
            .find(|s| s.viewport_name() == viewport)
            .cloned()
    }

    /// 当前登记的全部槽（按注册顺序）。
    pub(crate) fn slots(&self) -> Vec<Arc<ViewportSlot>> {
        self.slots.lock().clone()
    }
}

impl std::fmt::Debug for RouteContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteContext")
            .field("name", &self.name)
            .field("viewports", &self.slots.lock().len())
            .finish()
    }
}

/// 路由树解析器接缝：指令树 → 已解析节点树。
///
/// # 教案式说明
/// - **意图 (Why)**：URL 文法与路由表匹配是独立关注点；内核只要求"给我一棵
///   `RouteNode` 树"，同步或异步皆可；
/// - **契约 (What)**：
///   - `resolve` 失败意味着指令无法匹配任何组件，导航在流水线启动前被拒绝；
///   - `resolve_residue` 服务动态解析模式：给定携带残余指令的节点，补解析出
///     新的子节点；默认实现返回空集（静态模式下永不调用）。
#[async_trait]
pub trait RouteTreeResolver: Send + Sync {
    /// 将指令树解析为完整目标树。
    async fn resolve(&self, instructions: &InstructionTree) -> Result<RouteTree, HelmError>;

    /// 补解析节点上的残余指令，产出运行期发现的子节点。
    async fn resolve_residue(&self, node: &RouteNode) -> Result<Vec<RouteNode>, HelmError> {
        let _ = node;
        Ok(Vec::new())
    }
}

/// 指令解析器接缝：裸路径 → 指令树。由宿主应用按其 URL 文法实现。
pub trait InstructionParser: Send + Sync {
    /// 解析路径文本。
    fn parse(&self, path: &str) -> Result<InstructionTree, HelmError>;
}

/// 历史记录层接缝：内核在导航提交/回滚时通知，不反向依赖浏览器 API。
///
/// 宿主层收到的 popstate/hashchange 事件应转译为
/// [`Router::handle_location_change`](crate::router::Router::handle_location_change) 调用。
pub trait HistoryAdapter: Send + Sync {
    /// 追加一条历史记录。
    fn push(&self, path: &str);
    /// 替换当前历史记录。
    fn replace(&self, path: &str);
    /// 当前路径（回滚时用于恢复）。
    fn current_path(&self) -> String;
}
