//! # component 模块：组件代理
//!
//! ## 核心意图（Why）
//! - 把"组件实例 + 若干附加钩子对象"适配为统一的生命周期调用面：视口代理
//!   只面对一个 `ComponentAgent`，不关心钩子分布在实例上还是附加对象上。
//! - 同一组件的全部钩子作为**同一 Batch 阶段内的兄弟单元**发起：每次调用前
//!   push、完成续接里 pop，异步钩子只挂起自己，不阻塞兄弟。
//!
//! ## 行为契约（What）
//! - 发起顺序：附加钩子对象在前，实例自身方法最后；完成顺序不作保证；
//! - 守卫结果写入 `Transition`：`can_load` 的裁决按最强限制合并，
//!   `can_unload` 返回 `false` 视为取消；
//! - 每个调用都经 `Transition::run` 包装：取消后不再发起，错误即终止导航。

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, trace};

use crate::batch::Batch;
use crate::hook::{Component, ComponentHandle, GuardVerdict, HookResult, Lifecycle};
use crate::instruction::ComponentKind;
use crate::node::RouteNode;
use crate::scheduler::Scheduler;
use crate::transition::Transition;

/// 组件代理的共享句柄。
///
/// 同一实例可同时作为某视口的 curr 与 next（invoke-lifecycles / none 计划），
/// 因此以 `Arc<Mutex<_>>` 承载；锁只在钩子发起的瞬间持有。
pub(crate) type ComponentAgentRef = Arc<Mutex<ComponentAgent>>;

/// 组件代理：一个活体组件实例与其附加钩子的统一调用面。
pub struct ComponentAgent {
    kind: ComponentKind,
    instance: Box<dyn Component>,
    hooks: Vec<Box<dyn Lifecycle>>,
}

impl ComponentAgent {
    /// 由工厂产物构造代理。
    pub(crate) fn new(handle: ComponentHandle) -> Self {
        Self {
            kind: handle.instance.kind(),
            instance: handle.instance,
            hooks: handle.hooks,
        }
    }

    pub(crate) fn shared(handle: ComponentHandle) -> ComponentAgentRef {
        Arc::new(Mutex::new(Self::new(handle)))
    }

    /// 组件类型身份。
    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    /// 以"附加钩子在前、实例最后"的固定顺序发起一轮生命周期调用。
    ///
    /// `invoke` 对每个目标执行一次；push/pop 配对与 `Transition::run` 包装由
    /// 各调用点负责（守卫类与副作用类的续接不同）。
    fn each_lifecycle(&mut self, mut invoke: impl FnMut(&mut dyn Lifecycle)) {
        let Self {
            instance, hooks, ..
        } = self;
        for hook in hooks.iter_mut() {
            invoke(hook.as_mut());
        }
        invoke(&mut **instance);
    }

    /// 发起全部 `can_load` 钩子；裁决合并进 `tr.guards_result`。
    pub(crate) fn can_load(&mut self, tr: &Transition, next: &RouteNode, b: &Batch) {
        trace!(transition = tr.id(), component = %self.kind, "canLoad");
        b.push();
        self.each_lifecycle(|hook| {
            let bc = b.clone();
            let bk = b.clone();
            let trc = tr.clone();
            tr.run(
                || {
                    bc.push();
                    hook.can_load(next)
                },
                move |verdict| {
                    trc.merge_guard(verdict);
                    bk.pop();
                },
            );
        });
        b.pop();
    }

    /// 发起全部 `load` 钩子。
    pub(crate) fn load(&mut self, tr: &Transition, next: &RouteNode, b: &Batch) {
        trace!(transition = tr.id(), component = %self.kind, "load");
        b.push();
        self.each_lifecycle(|hook| {
            let bc = b.clone();
            let bk = b.clone();
            tr.run(
                || {
                    bc.push();
                    hook.load(next)
                },
                move |()| bk.pop(),
            );
        });
        b.pop();
    }

    /// 发起全部 `can_unload` 钩子；`false` 视为取消。
    pub(crate) fn can_unload(&mut self, tr: &Transition, next: Option<&RouteNode>, b: &Batch) {
        trace!(transition = tr.id(), component = %self.kind, "canUnload");
        b.push();
        self.each_lifecycle(|hook| {
            let bc = b.clone();
            let bk = b.clone();
            let trc = tr.clone();
            tr.run(
                || {
                    bc.push();
                    hook.can_unload(next)
                },
                move |allowed| {
                    if !allowed {
                        trc.merge_guard(GuardVerdict::Cancel);
                    }
                    bk.pop();
                },
            );
        });
        b.pop();
    }

    /// 发起全部 `unload` 钩子。
    pub(crate) fn unload(&mut self, tr: &Transition, next: Option<&RouteNode>, b: &Batch) {
        trace!(transition = tr.id(), component = %self.kind, "unload");
        b.push();
        self.each_lifecycle(|hook| {
            let bc = b.clone();
            let bk = b.clone();
            tr.run(
                || {
                    bc.push();
                    hook.unload(next)
                },
                move |()| bk.pop(),
            );
        });
        b.pop();
    }

    /// 发起全部 `activate` 钩子。
    pub(crate) fn activate(&mut self, tr: &Transition, b: &Batch) {
        trace!(transition = tr.id(), component = %self.kind, "activate");
        b.push();
        self.each_lifecycle(|hook| {
            let bc = b.clone();
            let bk = b.clone();
            tr.run(
                || {
                    bc.push();
                    hook.activate()
                },
                move |()| bk.pop(),
            );
        });
        b.pop();
    }

    /// 宿主 attach 直达入口：不经 Transition，异步钩子挂上调度器，错误仅记日志。
    pub(crate) fn activate_detached(&mut self, scheduler: &Scheduler) {
        trace!(component = %self.kind, "activate (detached)");
        self.each_lifecycle(|hook| match hook.activate() {
            HookResult::Ready(Ok(())) => {}
            HookResult::Ready(Err(error)) => {
                error!(%error, "detached activate hook failed");
            }
            HookResult::Pending(fut) => scheduler.defer_hook(fut, |outcome| {
                if let Err(error) = outcome {
                    error!(%error, "detached activate hook failed");
                }
            }),
        });
    }

    /// 宿主 detach 直达入口：对应 [`Self::activate_detached`]。
    pub(crate) fn deactivate_detached(&mut self, scheduler: &Scheduler) {
        trace!(component = %self.kind, "deactivate (detached)");
        self.each_lifecycle(|hook| match hook.deactivate() {
            HookResult::Ready(Ok(())) => {}
            HookResult::Ready(Err(error)) => {
                error!(%error, "detached deactivate hook failed");
            }
            HookResult::Pending(fut) => scheduler.defer_hook(fut, |outcome| {
                if let Err(error) = outcome {
                    error!(%error, "detached deactivate hook failed");
                }
            }),
        });
    }

    /// 发起全部 `deactivate` 钩子。
    pub(crate) fn deactivate(&mut self, tr: &Transition, b: &Batch) {
        trace!(transition = tr.id(), component = %self.kind, "deactivate");
        b.push();
        self.each_lifecycle(|hook| {
            let bc = b.clone();
            let bk = b.clone();
            tr.run(
                || {
                    bc.push();
                    hook.deactivate()
                },
                move |()| bk.pop(),
            );
        });
        b.pop();
    }
}

impl std::fmt::Debug for ComponentAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentAgent")
            .field("kind", &self.kind)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
