//! # Batch：引用计数的扇出/扇入同步原语
//!
//! ## 核心意图（Why）
//! - 生命周期调用会在宽度未知、运行期动态发现的视口树上扇出，且同步/异步结果混杂；
//!   Batch 允许每一层遍历通过未配对的 `push()` 把当前阶段"撑开"，直到所有动态加入的
//!   子单元逐一 `pop()`，链条才机械地推进到下一阶段——调用方无需预知异步单元总数。
//! - 与通道或计数信号量相比，Batch 把"阶段回调 + 计数传播"合并为单链表结构，
//!   回调在计数归零的那一次 `pop()` 调用栈上同步触发，不经过任何调度器。
//!
//! ## 行为契约（What）
//! - `Batch::start(cb)` 构造链头（计数 0，回调暂存，不触发）；
//! - `continue_with(cb)` 在链尾追加阶段，**继承追加时刻链尾的计数值**：
//!   在若干次 push 之后才挂接的阶段，天然为这些在途单元"预挂起"；
//! - `push()` 自接收阶段起沿链逐个加一；`pop()` 对称减一，并对任何减到零的阶段
//!   **先同步触发回调、再继续向后递减**；
//! - `begin()` 从链头执行一次 push + pop：若此刻无在途异步单元，第一阶段立即触发；
//! - 每个阶段的回调至多触发一次（触发前被取出，`done` 置位）；
//! - pop 多于 push 属于编程错误，立即 panic——计数纪律必须围绕每个延迟单元 1:1 配对。
//!
//! ## 风险提示（Trade-offs）
//! - Batch 自身不携带错误通道：回调内的异常由调用栈传播，钩子错误走
//!   `Transition` 的 reject 路径；
//! - 回调在触发时不持有任何内部锁，允许回调中再入 push/pop/continue_with。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

type StageCallback = Box<dyn FnOnce(&Batch) + Send>;

/// 单个阶段节点：计数、一次性回调、完成标记与后继指针。
struct Stage {
    stack: Mutex<u64>,
    cb: Mutex<Option<StageCallback>>,
    done: AtomicBool,
    next: Mutex<Option<Arc<Stage>>>,
}

impl Stage {
    fn new(stack: u64, cb: Option<StageCallback>) -> Arc<Self> {
        Arc::new(Self {
            stack: Mutex::new(stack),
            cb: Mutex::new(cb),
            done: AtomicBool::new(false),
            next: Mutex::new(None),
        })
    }
}

/// Batch 句柄：指向链中某一阶段，同时持有链头以支持 `begin()`。
///
/// # 教案式说明
/// - **意图 (Why)**：句柄按值克隆、跨闭包传递；所有克隆共享同一条阶段链；
/// - **契约 (What)**：`push`/`pop` 以句柄所指阶段为起点沿链传播；阶段回调收到的
///   参数即该阶段自身的句柄，可继续对其 push/pop 以"撑开"后续阶段；
/// - **风险 (Trade-offs)**：链表为单向，无法在中间插入阶段；该限制与流水线
///   "只追加、不回溯"的使用方式一致。
#[derive(Clone)]
pub struct Batch {
    stage: Arc<Stage>,
    head: Arc<Stage>,
}

impl Batch {
    /// 以 `cb` 为第一阶段构造新链。回调此时不触发，需经 `begin()` 或计数归零驱动。
    pub fn start(cb: impl FnOnce(&Batch) + Send + 'static) -> Self {
        let head = Stage::new(0, Some(Box::new(cb)));
        Self {
            stage: Arc::clone(&head),
            head,
        }
    }

    /// 在链尾追加一个阶段，返回指向新阶段的句柄。
    ///
    /// - **契约 (What)**：新阶段继承链尾**当前**计数值；已经发生的 push 对新阶段
    ///   同样生效，后续 pop 会把它一并释放。
    /// - **风险 (Trade-offs)**：在正在触发的尾阶段回调内追加时，继承计数为 0，
    ///   进行中的 pop 游走不覆盖新阶段；新阶段须由自己的 push/pop 配对驱动。
    pub fn continue_with(&self, cb: impl FnOnce(&Batch) + Send + 'static) -> Self {
        let mut cur = Arc::clone(&self.stage);
        loop {
            let next = cur.next.lock().clone();
            match next {
                Some(n) => cur = n,
                None => break,
            }
        }
        let inherited = *cur.stack.lock();
        let stage = Stage::new(inherited, Some(Box::new(cb)));
        *cur.next.lock() = Some(Arc::clone(&stage));
        Self {
            stage,
            head: Arc::clone(&self.head),
        }
    }

    /// 自本阶段起沿链逐个加一。
    pub fn push(&self) {
        let mut cur = Arc::clone(&self.stage);
        loop {
            *cur.stack.lock() += 1;
            let next = cur.next.lock().clone();
            match next {
                Some(n) => cur = n,
                None => break,
            }
        }
    }

    /// 自本阶段起沿链逐个减一；减到零的阶段在**本调用栈上**同步触发回调，
    /// 随后继续向后递减。
    ///
    /// # Panics
    ///
    /// 计数已为零时再 pop 视为配对纪律被破坏，立即 panic。
    pub fn pop(&self) {
        let mut cur = Arc::clone(&self.stage);
        loop {
            let fire = {
                let mut stack = cur.stack.lock();
                assert!(*stack > 0, "batch pop without matching push");
                *stack -= 1;
                *stack == 0
            };
            // 触发前快照后继:回调期间追加的阶段未被本轮的 push 覆盖,
            // 游走到它会在零计数上误报失衡。
            let next = cur.next.lock().clone();
            if fire {
                Self::invoke(&cur, &self.head);
            }
            match next {
                Some(n) => cur = n,
                None => break,
            }
        }
    }

    /// 从链头执行一次 push + pop，在无在途异步单元时同步踢动第一阶段。
    pub fn begin(&self) -> Self {
        let head = Self {
            stage: Arc::clone(&self.head),
            head: Arc::clone(&self.head),
        };
        head.push();
        head.pop();
        self.clone()
    }

    /// 本阶段回调是否已经触发。
    pub fn is_done(&self) -> bool {
        self.stage.done.load(Ordering::Acquire)
    }

    fn invoke(stage: &Arc<Stage>, head: &Arc<Stage>) {
        // 先取出回调再调用，确保至多触发一次；调用期间不持有任何锁。
        let cb = stage.cb.lock().take();
        if let Some(cb) = cb {
            let handle = Batch {
                stage: Arc::clone(stage),
                head: Arc::clone(head),
            };
            cb(&handle);
            stage.done.store(true, Ordering::Release);
        }
    }
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch")
            .field("stack", &*self.stage.stack.lock())
            .field("done", &self.stage.done.load(Ordering::Relaxed))
            .finish()
    }
}
