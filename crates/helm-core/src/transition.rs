//! # transition 模块：一次在途导航的完整状态
//!
//! ## 核心意图（Why）
//! - Transition 是"一次导航尝试"的唯一事实来源：守卫裁决、终止错误、前后路由树
//!   与结果通道都挂在它身上；全树所有代理通过同一个 Transition 协同，
//!   任何一处的取消或错误即刻对全树生效。
//! - `run` 是流水线的统一步进包装：守卫不放行或已有错误时整步跳过——这就是
//!   "一处取消、全树静默"的实现机制；异步结果挂到协作式调度器上续接。
//!
//! ## 行为契约（What）
//! - 同一时刻至多一个 Transition 处于活动态（由 Router 的驱动循环保证）；
//! - 被取代（supersede）或重定向的 Transition 不丢弃结果通道：senders 被转移给
//!   后继 Transition，原调用方最终随后继的结局一起兑现；
//! - 一旦 `error` 被记录，该 Transition 上所有后续 `run` 均为空操作，
//!   结果通道立即以该错误 reject。
//!
//! ## 风险提示（Trade-offs）
//! - `run` 的续接在守卫变为不放行之后**仍会执行**（用于维持 Batch 计数配对与
//!   状态机推进）；续接内不得再发起新的钩子调用——发起必须经由新的 `run`。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::channel::oneshot;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::context::RouteTreeResolver;
use crate::error::HelmError;
use crate::hook::{ComponentFactory, GuardVerdict, HookResult};
use crate::instruction::{InstructionTree, NavigationTrigger};
use crate::node::RouteTree;
use crate::router::RouterOptions;
use crate::scheduler::Scheduler;

/// 导航结果通道的发送端。
pub(crate) type CompletionSender = oneshot::Sender<Result<bool, HelmError>>;

/// 一次在途导航尝试。句柄按值克隆，共享同一份内部状态。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - `id` 单调递增，事件流与日志以其关联同一次导航；
///   - `guards_result` 初始为放行，只会单调变"严"（Cancel > Redirect > Allow）；
///   - `error` 至多记录一次，后到的错误被丢弃（首错优先）；
/// - **风险 (Trade-offs)**：内部以互斥量保护各字段；内核为单逻辑控制流，
///   锁仅表达共享所有权，不存在真实争用。
#[derive(Clone)]
pub struct Transition {
    inner: Arc<TransitionInner>,
}

struct TransitionInner {
    id: u64,
    trigger: NavigationTrigger,
    instructions: InstructionTree,
    prev_tree: RouteTree,
    guards: Mutex<GuardVerdict>,
    error: Mutex<Option<HelmError>>,
    changed: AtomicBool,
    cancelled: AtomicBool,
    senders: Mutex<Vec<CompletionSender>>,
    options: RouterOptions,
    scheduler: Arc<Scheduler>,
    factory: Arc<dyn ComponentFactory>,
    resolver: Arc<dyn RouteTreeResolver>,
}

impl Transition {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: u64,
        trigger: NavigationTrigger,
        instructions: InstructionTree,
        prev_tree: RouteTree,
        senders: Vec<CompletionSender>,
        options: RouterOptions,
        scheduler: Arc<Scheduler>,
        factory: Arc<dyn ComponentFactory>,
        resolver: Arc<dyn RouteTreeResolver>,
    ) -> Self {
        Self {
            inner: Arc::new(TransitionInner {
                id,
                trigger,
                instructions,
                prev_tree,
                guards: Mutex::new(GuardVerdict::Allow),
                error: Mutex::new(None),
                changed: AtomicBool::new(false),
                cancelled: AtomicBool::new(false),
                senders: Mutex::new(senders),
                options,
                scheduler,
                factory,
                resolver,
            }),
        }
    }

    /// 导航序号。
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// 触发来源。
    pub fn trigger(&self) -> NavigationTrigger {
        self.inner.trigger
    }

    /// 本次导航的目标指令树。
    pub fn instructions(&self) -> &InstructionTree {
        &self.inner.instructions
    }

    /// 导航前的路由树快照。
    pub fn prev_tree(&self) -> &RouteTree {
        &self.inner.prev_tree
    }

    /// 本次导航的生效配置。
    pub fn options(&self) -> RouterOptions {
        self.inner.options
    }

    pub(crate) fn factory(&self) -> &Arc<dyn ComponentFactory> {
        &self.inner.factory
    }

    pub(crate) fn resolver(&self) -> &Arc<dyn RouteTreeResolver> {
        &self.inner.resolver
    }

    /// 当前守卫裁决快照。
    pub fn guards_result(&self) -> GuardVerdict {
        self.inner.guards.lock().clone()
    }

    /// 守卫是否仍放行。
    pub fn guards_allow(&self) -> bool {
        self.inner.guards.lock().is_allow()
    }

    /// 合并一个守卫裁决（限制性最强者胜）。
    pub fn merge_guard(&self, verdict: GuardVerdict) {
        if verdict.is_allow() {
            return;
        }
        let mut guards = self.inner.guards.lock();
        let merged = guards.clone().merge(verdict);
        if *guards != merged {
            debug!(transition = self.inner.id, verdict = ?merged, "guard verdict tightened");
            *guards = merged;
        }
    }

    /// 是否已记录终止错误。
    pub fn has_error(&self) -> bool {
        self.inner.error.lock().is_some()
    }

    /// 终止错误快照。
    pub fn error(&self) -> Option<HelmError> {
        self.inner.error.lock().clone()
    }

    /// 任意视口的跃迁计划不为 `none` 时置位；决定成功导航兑现 `true` 还是 `false`。
    pub(crate) fn mark_changed(&self) {
        self.inner.changed.store(true, Ordering::Release);
    }

    pub(crate) fn changed(&self) -> bool {
        self.inner.changed.load(Ordering::Acquire)
    }

    /// 取消导航流程是否已经执行过（保证 `cancel_navigation` 恰好一次）。
    pub(crate) fn mark_cancelled(&self) -> bool {
        !self.inner.cancelled.swap(true, Ordering::AcqRel)
    }

    /// 转移结果通道（重定向 / 被取代时复用，从不丢弃）。
    pub(crate) fn take_senders(&self) -> Vec<CompletionSender> {
        std::mem::take(&mut *self.inner.senders.lock())
    }

    /// 以成功（`true`）或良性取消（`false`）兑现全部结果通道。
    pub(crate) fn resolve(&self, navigated: bool) {
        for sender in self.take_senders() {
            let _ = sender.send(Ok(navigated));
        }
    }

    /// 记录终止错误并 reject 全部结果通道；首错优先，重复调用为空操作。
    pub fn handle_error(&self, error: HelmError) {
        {
            let mut slot = self.inner.error.lock();
            if slot.is_some() {
                trace!(transition = self.inner.id, %error, "subsequent error ignored");
                return;
            }
            debug!(transition = self.inner.id, %error, "transition erred");
            *slot = Some(error.clone());
        }
        for sender in self.take_senders() {
            let _ = sender.send(Err(error.clone()));
        }
    }

    /// 统一步进包装。
    ///
    /// # 教案式注释
    /// - **意图 (Why)**：所有钩子发起都经由此处，取消与错误因此能在全树范围
    ///   静默后续步骤；
    /// - **契约 (What)**：
    ///   - 守卫不放行或已有错误 ⇒ 整步跳过（`step` 不执行）；
    ///   - `step` 同步返回值 ⇒ `continuation` 在当前调用栈立即执行；
    ///   - `step` 挂起 ⇒ 完成后在驱动循环上续接；异步错误走 `handle_error`；
    ///   - **后置条件**：`step` 一旦执行，其成功续接必然执行（即使期间守卫收紧），
    ///     以维持 Batch 计数配对与状态机推进。
    pub fn run<T: Send + 'static>(
        &self,
        step: impl FnOnce() -> HookResult<T>,
        continuation: impl FnOnce(T) + Send + 'static,
    ) {
        if !self.guards_allow() || self.has_error() {
            trace!(transition = self.inner.id, "step skipped (guard/error)");
            return;
        }
        match step() {
            HookResult::Ready(Ok(value)) => continuation(value),
            HookResult::Ready(Err(error)) => self.handle_error(error),
            HookResult::Pending(fut) => {
                let tr = self.clone();
                self.inner.scheduler.defer_hook(fut, move |outcome| match outcome {
                    Ok(value) => continuation(value),
                    Err(error) => tr.handle_error(error),
                });
            }
        }
    }
}

impl std::fmt::Debug for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transition")
            .field("id", &self.inner.id)
            .field("trigger", &self.inner.trigger)
            .field("guards", &*self.inner.guards.lock())
            .field("error", &*self.inner.error.lock())
            .finish()
    }
}
