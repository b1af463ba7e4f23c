//! # hook 模块：生命周期能力契约
//!
//! ## 角色定位（Why）
//! - 组件与附加钩子对象通过本模块的 [`Lifecycle`] 能力集接入流水线：
//!   `can_load` / `load` / `can_unload` / `unload` / `activate` / `deactivate`
//!   均为可选能力，默认实现为"放行/空操作"，覆写即表示具备该能力；
//! - 钩子的返回值统一为 [`HookResult`]：要么同步给出结果，要么交还一个自有的
//!   Future 由协作式调度器在完成时续接——这是整个内核"同步发起、异步汇合"
//!   模型的用户侧入口。
//!
//! ## 契约定位（What）
//! - 钩子方法在流水线阶段回调内**同步发起**；返回 `Pending` 的钩子只挂起其所在
//!   分支，兄弟分支照常推进；
//! - 守卫钩子（`can_load`）以 [`GuardVerdict`] 表达放行/取消/重定向，多个钩子的
//!   裁决按"限制性最强者胜"合并（Cancel > Redirect > Allow）；
//! - `can_unload` 仅表达布尔式放行：卸载路径没有"重定向到别处再卸载"的语义。

use std::fmt;

use futures::future::BoxFuture;

use crate::error::HelmError;
use crate::instruction::{ComponentKind, InstructionTree};
use crate::node::RouteNode;

/// 钩子的异步结果载体。
pub type HookFuture<T> = BoxFuture<'static, Result<T, HelmError>>;

/// 钩子调用的统一返回：同步完成或挂起等待。
///
/// # 教案式说明
/// - **意图 (Why)**：流水线不关心钩子内部是否异步，只关心"现在有值"还是
///   "完成时续接"；两种路径都经由 `Transition::run` 汇入同一条错误/取消通道；
/// - **契约 (What)**：`Pending` 携带的 Future 必须自有（`'static`），不得借用
///   组件自身——组件在 Future 完成前可能被其他续接路径访问；
/// - **风险 (Trade-offs)**：同步路径零分配；异步路径固定一次装箱，换取统一类型。
pub enum HookResult<T> {
    /// 同步完成（含同步失败）。
    Ready(Result<T, HelmError>),
    /// 挂起：完成时由调度器驱动续接。
    Pending(HookFuture<T>),
}

impl<T> HookResult<T> {
    /// 同步成功。
    pub fn ok(value: T) -> Self {
        Self::Ready(Ok(value))
    }

    /// 同步失败：将终止整条在途导航。
    pub fn err(error: HelmError) -> Self {
        Self::Ready(Err(error))
    }

    /// 包装一个自有 Future。
    pub fn pending(
        fut: impl std::future::Future<Output = Result<T, HelmError>> + Send + 'static,
    ) -> Self {
        Self::Pending(Box::pin(fut))
    }
}

impl HookResult<GuardVerdict> {
    /// 守卫放行的便捷构造。
    pub fn allow() -> Self {
        Self::ok(GuardVerdict::Allow)
    }
}

impl HookResult<()> {
    /// 空操作钩子的便捷构造。
    pub fn done() -> Self {
        Self::ok(())
    }
}

impl<T: fmt::Debug> fmt::Debug for HookResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(r) => f.debug_tuple("Ready").field(r).finish(),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// 守卫裁决：放行、取消或重定向。
///
/// # 教案式说明
/// - **意图 (Why)**：守卫阶段（canUnload/canLoad）的产物不是错误而是裁决，
///   据此 Router 决定继续、回滚或换一条导航重来；
/// - **契约 (What)**：合并顺序为 Cancel > Redirect > Allow；多个重定向并存时
///   保留最先出现者（后到的重定向不覆盖已有目标）；
/// - **风险 (Trade-offs)**：重定向指令树为完整值拷贝；守卫场景频率低，不值得
///   为此引入共享结构。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GuardVerdict {
    /// 放行。
    Allow,
    /// 取消本次导航，回滚到导航前状态。
    Cancel,
    /// 以给定指令树替换本次导航（复用原导航的结果通道）。
    Redirect(InstructionTree),
}

impl GuardVerdict {
    /// 是否放行。
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// 按"限制性最强者胜"合并两个裁决。
    pub fn merge(self, other: GuardVerdict) -> GuardVerdict {
        match (self, other) {
            (Self::Cancel, _) | (_, Self::Cancel) => Self::Cancel,
            (Self::Redirect(t), _) => Self::Redirect(t),
            (Self::Allow, other) => other,
        }
    }
}

/// 生命周期能力集。
///
/// # 教案式说明
/// - **意图 (Why)**：以"默认实现 = 不具备该能力"的方式建模可选钩子：未覆写的
///   方法等价于放行/空操作，观察行为与按能力接口逐一探测一致，但免去动态探测；
/// - **契约 (What)**：
///   - `can_*` 在对应的 `load`/`unload` 之前调用，且仅在裁决全树放行后才进入
///     副作用阶段；
///   - `activate`/`deactivate` 仅在组件实例真正更换（replace 计划）或宿主元素
///     attach/detach 时调用；
///   - 所有方法同步发起；返回 `Pending` 即挂起该分支；
/// - **风险 (Trade-offs)**：`&mut self` 签名意味着钩子执行期间组件被独占借用，
///   钩子内不得同步回调路由器（会形成重入死锁），异步续接不受此限。
pub trait Lifecycle: Send {
    /// 目标节点可否加载到本组件。
    fn can_load(&mut self, next: &RouteNode) -> HookResult<GuardVerdict> {
        let _ = next;
        HookResult::allow()
    }

    /// 加载目标节点（参数注入、数据预取等副作用）。
    fn load(&mut self, next: &RouteNode) -> HookResult<()> {
        let _ = next;
        HookResult::done()
    }

    /// 当前组件可否卸载。`next` 为即将取代本组件的节点（纯移除时为 `None`）。
    fn can_unload(&mut self, next: Option<&RouteNode>) -> HookResult<bool> {
        let _ = next;
        HookResult::ok(true)
    }

    /// 卸载（资源释放等副作用）。
    fn unload(&mut self, next: Option<&RouteNode>) -> HookResult<()> {
        let _ = next;
        HookResult::done()
    }

    /// 激活：组件实例即将对宿主可见。
    fn activate(&mut self) -> HookResult<()> {
        HookResult::done()
    }

    /// 反激活：组件实例即将从宿主移除。
    fn deactivate(&mut self) -> HookResult<()> {
        HookResult::done()
    }
}

/// 可被路由的组件：生命周期能力集 + 类型身份。
pub trait Component: Lifecycle {
    /// 组件类型身份，用于跃迁计划选取。
    fn kind(&self) -> ComponentKind;
}

/// 工厂产物：组件实例与其附加钩子对象。
///
/// 附加钩子在流水线中先于实例自身的钩子**发起**（完成顺序不作保证）。
pub struct ComponentHandle {
    /// 组件实例。
    pub instance: Box<dyn Component>,
    /// 附加的生命周期钩子对象，按发现顺序排列。
    pub hooks: Vec<Box<dyn Lifecycle>>,
}

impl ComponentHandle {
    /// 无附加钩子的便捷构造。
    pub fn bare(instance: Box<dyn Component>) -> Self {
        Self {
            instance,
            hooks: Vec::new(),
        }
    }
}

impl fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHandle")
            .field("kind", &self.instance.kind())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// 组件工厂：DI / 实例化的外部接缝。
///
/// - **契约 (What)**：给定已解析节点，返回活体实例并完成附加钩子的发现；
/// - **风险 (Trade-offs)**：工厂失败被视为导航错误（非守卫拒绝），将 reject
///   整条导航。
pub trait ComponentFactory: Send + Sync {
    /// 为节点实例化组件。
    fn create(&self, node: &RouteNode) -> Result<ComponentHandle, HelmError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::NavigationInstruction;

    #[test]
    fn guard_merge_is_most_restrictive_wins() {
        let redirect = GuardVerdict::Redirect(InstructionTree::single(NavigationInstruction::new(
            ComponentKind("elsewhere"),
        )));
        assert_eq!(
            GuardVerdict::Allow.merge(GuardVerdict::Cancel),
            GuardVerdict::Cancel
        );
        assert_eq!(
            redirect.clone().merge(GuardVerdict::Cancel),
            GuardVerdict::Cancel
        );
        assert_eq!(GuardVerdict::Allow.merge(redirect.clone()), redirect);
        // 先到的重定向不被后到者覆盖。
        let other = GuardVerdict::Redirect(InstructionTree::single(NavigationInstruction::new(
            ComponentKind("other"),
        )));
        assert_eq!(redirect.clone().merge(other), redirect);
    }
}
