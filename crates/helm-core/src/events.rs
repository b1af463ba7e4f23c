//! # events 模块：导航事件流
//!
//! 面向应用代码发布 `NavigationStart` / `NavigationEnd` / `NavigationCancel` /
//! `NavigationError` 四类事件，携带导航序号与指令树。订阅者以回调形式登记，
//! 回调在导航驱动的调用栈上同步执行，不得长时间阻塞。

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::HelmError;
use crate::instruction::{InstructionTree, NavigationTrigger};

/// 导航事件。
#[derive(Clone, Debug)]
pub enum RouterEvent {
    /// 导航开始（已通过前置校验，流水线即将启动）。
    NavigationStart {
        /// 导航序号。
        id: u64,
        /// 触发来源。
        trigger: NavigationTrigger,
        /// 目标指令树。
        instructions: InstructionTree,
    },
    /// 导航成功提交。
    NavigationEnd {
        /// 导航序号。
        id: u64,
        /// 目标指令树。
        instructions: InstructionTree,
        /// 是否有任何视口实际变更（同 URL 空导航为 `false`）。
        navigated: bool,
    },
    /// 导航被守卫取消或被重定向取代。
    NavigationCancel {
        /// 导航序号。
        id: u64,
        /// 目标指令树。
        instructions: InstructionTree,
    },
    /// 导航因钩子/解析错误终止。
    NavigationError {
        /// 导航序号。
        id: u64,
        /// 终止错误。
        error: HelmError,
    },
}

type Subscriber = std::sync::Arc<dyn Fn(&RouterEvent) + Send + Sync>;

/// 订阅句柄；交还给 [`RouterEvents::unsubscribe`] 可解除订阅。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SubscriptionId(u64);

/// 事件总线：订阅者注册表。
///
/// # 教案式说明
/// - **意图 (Why)**：把导航进度暴露给应用层（埋点、加载指示器、错误兜底），
///   内核自身不消费这些事件；
/// - **契约 (What)**：发布顺序与导航推进顺序一致；订阅回调同步执行；
/// - **风险 (Trade-offs)**：回调 panic 会沿驱动栈向上传播，订阅方自行兜底。
#[derive(Default)]
pub struct RouterEvents {
    subscribers: Mutex<Vec<(u64, Subscriber)>>,
    next_id: AtomicU64,
}

impl RouterEvents {
    /// 创建空总线。
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记订阅者。
    pub fn subscribe(&self, f: impl Fn(&RouterEvent) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push((id, std::sync::Arc::new(f)));
        SubscriptionId(id)
    }

    /// 解除订阅；重复解除为空操作。
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.lock().retain(|(sid, _)| *sid != id.0);
    }

    pub(crate) fn publish(&self, event: RouterEvent) {
        // 快照后发布：允许回调内再订阅/退订而不死锁。
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, f)| std::sync::Arc::clone(f))
            .collect();
        for f in subscribers {
            f(&event);
        }
    }
}

impl std::fmt::Debug for RouterEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterEvents")
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}
