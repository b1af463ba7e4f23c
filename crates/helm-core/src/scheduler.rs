//! # scheduler 模块：协作式单逻辑线程驱动器
//!
//! ## 核心意图（Why）
//! - 内核假定单一逻辑控制流：钩子返回挂起结果时，仅该分支让出，兄弟分支继续；
//!   没有并行线程，只有同一流水线阶段内逻辑上并发的多个在途异步单元。
//! - 驱动器把"Future 完成后要执行的续接闭包"显式化：Future 在后台被轮询，
//!   完成后其续接在驱动循环的调用栈上同步执行——续接中触发的 `Batch::pop`
//!   及其阶段回调因此天然串行，无需额外互斥。
//!
//! ## 行为契约（What）
//! - [`Scheduler::defer`] 把一个"完成后交出续接闭包"的任务挂入队列；
//! - [`Scheduler::drain`] 以 `FuturesUnordered` 轮询全部在途任务，逐个执行完成者
//!   的续接；续接执行期间新挂入的任务会被同一轮循环接续吸收；
//! - 队列与在途集合都排空时 `drain` 返回——此刻所有同步续接已执行完毕。
//!
//! ## 风险提示（Trade-offs）
//! - 永不完成的钩子 Future 会让 `drain` 永久等待：内核不提供超时层，
//!   悬挂钩子使其 Transition 无限期停滞（这是明确的契约边界）。

use std::collections::VecDeque;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;

use crate::error::HelmError;
use crate::hook::HookFuture;

/// 完成后交出续接闭包的延迟任务。
type DeferredTask = BoxFuture<'static, Box<dyn FnOnce() + Send>>;

/// 协作式驱动器。
///
/// # 教案式说明
/// - **意图 (Why)**：把钩子的异步完成汇聚到单一驱动循环，保证续接串行执行；
/// - **契约 (What)**：`defer` 可在任意续接/阶段回调内重入调用；`drain` 只应由
///   当前导航的驱动方（`Router` 的驱动循环）调用；
/// - **风险 (Trade-offs)**：队列锁的持有窗口仅覆盖入队/搬运，续接执行时不持锁。
pub struct Scheduler {
    queue: Mutex<VecDeque<DeferredTask>>,
}

impl Scheduler {
    /// 创建空驱动器。
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// 挂入一个延迟任务。
    pub fn defer(&self, task: DeferredTask) {
        self.queue.lock().push_back(task);
    }

    /// 便捷入口：挂入钩子 Future 与其完成续接。
    pub fn defer_hook<T: Send + 'static>(
        &self,
        fut: HookFuture<T>,
        continuation: impl FnOnce(Result<T, HelmError>) + Send + 'static,
    ) {
        self.defer(Box::pin(async move {
            let outcome = fut.await;
            Box::new(move || continuation(outcome)) as Box<dyn FnOnce() + Send>
        }));
    }

    /// 轮询全部在途任务直至排空；完成者的续接在本调用栈上同步执行。
    pub async fn drain(&self) {
        let mut inflight: FuturesUnordered<DeferredTask> = FuturesUnordered::new();
        loop {
            {
                let mut queue = self.queue.lock();
                while let Some(task) = queue.pop_front() {
                    inflight.push(task);
                }
            }
            match inflight.next().await {
                Some(continuation) => continuation(),
                None => {
                    // 在途集合已空：若续接又挂入了新任务则继续，否则收工。
                    if self.queue.lock().is_empty() {
                        break;
                    }
                }
            }
        }
    }

    /// 当前是否没有任何待驱动任务。
    pub fn is_idle(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("queued", &self.queue.lock().len())
            .finish()
    }
}
