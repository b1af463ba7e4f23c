//! # router 模块:导航编排器
//!
//! ## 核心意图(Why)
//! - Router 持有根上下文、调度器、事件总线与外部接缝,把一次导航请求编排为
//!   八个 Batch 阶段:canUnload → 守卫检查 → canLoad → 守卫检查 → unload →
//!   load → swap → 收尾;
//! - 同一时刻至多一个 Transition 在途,另有**单个**待决槽:在途期间到达的新请求
//!   覆盖待决槽,被覆盖者的结果通道并入后来者——"最新意图胜出"。
//!
//! ## 行为契约(What)
//! - 所有失败路径都有归宿:解析失败/钩子错误 reject 结果通道并发布
//!   `NavigationError`;守卫取消兑现 `Ok(false)` 并发布 `NavigationCancel`;
//!   重定向把结果通道转移给后继导航,原调用方随后继结局兑现;
//! - 驱动循环是协作式的:第一个进入的调用方负责驱动,期间入队的请求由同一个
//!   驱动者依次处理,被取代的调用方只需等待自己的结果通道。
//!
//! ## 风险提示(Trade-offs)
//! - 内核不内建运行时:`load` 返回的 Future 由调用方的执行器驱动
//!   (测试用 `futures::executor::block_on`)。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::channel::oneshot;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::batch::Batch;
use crate::context::{HistoryAdapter, InstructionParser, RouteContext, RouteTreeResolver};
use crate::error::HelmError;
use crate::events::{RouterEvent, RouterEvents};
use crate::hook::{ComponentFactory, GuardVerdict};
use crate::instruction::{InstructionTree, NavigationTarget, NavigationTrigger};
use crate::node::{RouteTree, merge_by_viewport};
use crate::scheduler::Scheduler;
use crate::transition::{CompletionSender, Transition};

/// 新旧组件的激活/反激活交换顺序。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SwapOrder {
    /// 先激活新件,再反激活旧件(两者短暂共存)。
    SequentialAddFirst,
    /// 先反激活旧件,再激活新件。
    #[default]
    SequentialRemoveFirst,
    /// 两侧同批发起、并发完成;移除侧先行发起。
    ParallelRemoveFirst,
}

/// 成功导航对历史记录的写入方式。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum HistoryStrategy {
    /// 追加一条记录。
    #[default]
    Push,
    /// 替换当前记录。
    Replace,
    /// 不触碰历史记录。
    None,
}

/// 路由树解析时机。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ResolutionMode {
    /// 流水线启动前解析出完整目标树。
    #[default]
    Static,
    /// 允许残余指令,`canLoad` 阶段逐层补解析。
    Dynamic,
}

/// 路由器全局配置;按值拷贝进每个 Transition,在途导航不受后续改动影响。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RouterOptions {
    /// 交换顺序。
    pub swap_order: SwapOrder,
    /// 历史写入策略。
    pub history: HistoryStrategy,
    /// 解析时机。
    pub resolution: ResolutionMode,
}

struct PendingNavigation {
    trigger: NavigationTrigger,
    instructions: InstructionTree,
    options: RouterOptions,
    senders: Vec<CompletionSender>,
}

struct RouterState {
    current_tree: RouteTree,
    current_instructions: Option<InstructionTree>,
    pending: Option<PendingNavigation>,
    driving: bool,
}

/// 导航编排器。经 [`Router::builder`] 构造,以 `Arc` 共享。
pub struct Router {
    ctx: Arc<RouteContext>,
    scheduler: Arc<Scheduler>,
    events: RouterEvents,
    options: RouterOptions,
    factory: Arc<dyn ComponentFactory>,
    resolver: Arc<dyn RouteTreeResolver>,
    parser: Option<Arc<dyn InstructionParser>>,
    history: Option<Arc<dyn HistoryAdapter>>,
    state: Mutex<RouterState>,
    next_id: AtomicU64,
}

/// [`Router`] 的装配器:工厂与解析器必选,其余可选。
pub struct RouterBuilder {
    factory: Arc<dyn ComponentFactory>,
    resolver: Arc<dyn RouteTreeResolver>,
    parser: Option<Arc<dyn InstructionParser>>,
    history: Option<Arc<dyn HistoryAdapter>>,
    options: RouterOptions,
}

impl RouterBuilder {
    /// 覆盖全局配置。
    pub fn options(mut self, options: RouterOptions) -> Self {
        self.options = options;
        self
    }

    /// 接入指令解析器(启用按路径导航)。
    pub fn parser(mut self, parser: impl InstructionParser + 'static) -> Self {
        self.parser = Some(Arc::new(parser));
        self
    }

    /// 接入历史记录层。
    pub fn history(mut self, history: impl HistoryAdapter + 'static) -> Self {
        self.history = Some(Arc::new(history));
        self
    }

    /// 完成装配。
    pub fn build(self) -> Arc<Router> {
        Arc::new(Router {
            ctx: RouteContext::root(),
            scheduler: Arc::new(Scheduler::new()),
            events: RouterEvents::new(),
            options: self.options,
            factory: self.factory,
            resolver: self.resolver,
            parser: self.parser,
            history: self.history,
            state: Mutex::new(RouterState {
                current_tree: RouteTree::default(),
                current_instructions: None,
                pending: None,
                driving: false,
            }),
            next_id: AtomicU64::new(0),
        })
    }
}

impl Router {
    /// 开始装配一个路由器。
    pub fn builder(
        factory: Arc<dyn ComponentFactory>,
        resolver: Arc<dyn RouteTreeResolver>,
    ) -> RouterBuilder {
        RouterBuilder {
            factory,
            resolver,
            parser: None,
            history: None,
            options: RouterOptions::default(),
        }
    }

    /// 根上下文:顶层视口在此登记。
    pub fn context(&self) -> &Arc<RouteContext> {
        &self.ctx
    }

    /// 事件总线。
    pub fn events(&self) -> &RouterEvents {
        &self.events
    }

    /// 协作式调度器(宿主层直达入口需要)。
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// 已提交的路由树快照。
    pub fn current_tree(&self) -> RouteTree {
        self.state.lock().current_tree.clone()
    }

    /// 是否有导航在途。
    pub fn is_navigating(&self) -> bool {
        self.state.lock().driving
    }

    /// 发起一次程序化导航。
    ///
    /// # 教案式注释
    /// - **契约 (What)**:
    ///   - 成功且有实际变更 ⇒ `Ok(true)`;成功但所有视口计划均为 none
    ///     (如同址导航)⇒ `Ok(false)`;守卫取消 ⇒ `Ok(false)`;
    ///   - 在途期间再次调用 ⇒ 新请求进入待决槽,旧待决(若有)被覆盖,
    ///     其调用方随本次结局兑现;
    ///   - 解析失败、钩子错误 ⇒ `Err`;
    /// - **执行 (How)**:第一个调用方就地成为驱动者,驱动循环跑完自己与期间
    ///   入队的全部导航后返回;其余调用方只等待结果通道。
    pub async fn load(
        self: &Arc<Self>,
        target: impl Into<NavigationTarget>,
    ) -> Result<bool, HelmError> {
        self.navigate(target.into(), NavigationTrigger::Api, self.options)
            .await
    }

    /// 同 [`Router::load`],但对本次导航单独覆盖配置(如临时换交换顺序)。
    pub async fn load_with(
        self: &Arc<Self>,
        target: impl Into<NavigationTarget>,
        options: RouterOptions,
    ) -> Result<bool, HelmError> {
        self.navigate(target.into(), NavigationTrigger::Api, options)
            .await
    }

    /// 宿主层地址变化入口:popstate / hashchange 转译为导航。
    pub async fn handle_location_change(
        self: &Arc<Self>,
        path: &str,
        trigger: NavigationTrigger,
    ) -> Result<bool, HelmError> {
        self.navigate(NavigationTarget::Path(path.to_owned()), trigger, self.options)
            .await
    }

    async fn navigate(
        self: &Arc<Self>,
        target: NavigationTarget,
        trigger: NavigationTrigger,
        options: RouterOptions,
    ) -> Result<bool, HelmError> {
        let instructions = match target {
            NavigationTarget::Instructions(instructions) => instructions,
            NavigationTarget::Path(path) => match &self.parser {
                Some(parser) => parser.parse(&path)?,
                None => return Err(HelmError::ParserMissing { path }),
            },
        };
        let (tx, rx) = oneshot::channel();
        self.enqueue(trigger, instructions, options, vec![tx]);
        self.drive().await;
        rx.await.map_err(|_| HelmError::CompletionDropped)?
    }

    /// 覆盖待决槽;被覆盖者的结果通道并入新请求。
    fn enqueue(
        &self,
        trigger: NavigationTrigger,
        instructions: InstructionTree,
        options: RouterOptions,
        mut senders: Vec<CompletionSender>,
    ) {
        let mut st = self.state.lock();
        if let Some(superseded) = st.pending.take() {
            debug!(
                superseded = %superseded.instructions.to_path(),
                by = %instructions.to_path(),
                "pending navigation superseded"
            );
            let mut merged = superseded.senders;
            merged.append(&mut senders);
            senders = merged;
        }
        st.pending = Some(PendingNavigation {
            trigger,
            instructions,
            options,
            senders,
        });
    }

    /// 协作式驱动循环:仅首个进入者真正驱动,其余立即返回等待结果通道。
    async fn drive(self: &Arc<Self>) {
        {
            let mut st = self.state.lock();
            if st.driving {
                return;
            }
            st.driving = true;
        }
        loop {
            let pending = {
                let mut st = self.state.lock();
                let pending = st.pending.take();
                if pending.is_none() {
                    st.driving = false;
                }
                pending
            };
            match pending {
                Some(pending) => self.run_transition(pending).await,
                None => return,
            }
        }
    }

    async fn run_transition(self: &Arc<Self>, pending: PendingNavigation) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let prev_tree = self.state.lock().current_tree.clone();
        let tr = Transition::new(
            id,
            pending.trigger,
            pending.instructions,
            prev_tree,
            pending.senders,
            pending.options,
            Arc::clone(&self.scheduler),
            Arc::clone(&self.factory),
            Arc::clone(&self.resolver),
        );
        info!(transition = id, instructions = %tr.instructions().to_path(), "navigation start");

        // 流水线启动前解析目标树;失败则导航从未开始。
        let next_tree = match self.resolver.resolve(tr.instructions()).await {
            Ok(tree) => tree,
            Err(error) => {
                warn!(transition = id, %error, "instructions unresolvable");
                tr.handle_error(error.clone());
                self.events.publish(RouterEvent::NavigationError { id, error });
                return;
            }
        };
        self.events.publish(RouterEvent::NavigationStart {
            id,
            trigger: tr.trigger(),
            instructions: tr.instructions().clone(),
        });

        // 顶层差分:按视口名配对前后节点并逐槽排程。
        for (name, _, next) in merge_by_viewport(&tr.prev_tree().root, &next_tree.root) {
            match self.ctx.slot(name) {
                Some(slot) => slot.schedule_update(&tr, next.cloned()),
                None => tr.handle_error(HelmError::ViewportNotFound {
                    viewport: name.to_owned(),
                    context: self.ctx.name().to_owned(),
                }),
            }
        }
        if tr.has_error() {
            self.fail_navigation(&tr);
            return;
        }

        // 八阶段流水线。守卫检查阶段尽早取消,避免副作用阶段启动。
        let top = self.ctx.slots();
        let chain = Batch::start({
            let (tr, top) = (tr.clone(), top.clone());
            move |b| {
                for slot in &top {
                    slot.can_unload(&tr, b);
                }
            }
        })
        .continue_with({
            let (this, tr) = (Arc::clone(self), tr.clone());
            move |_| {
                if !tr.guards_allow() {
                    this.cancel_navigation(&tr);
                }
            }
        })
        .continue_with({
            let (tr, top) = (tr.clone(), top.clone());
            move |b| {
                for slot in &top {
                    slot.can_load(&tr, b);
                }
            }
        })
        .continue_with({
            let (this, tr) = (Arc::clone(self), tr.clone());
            move |_| {
                if !tr.guards_allow() {
                    this.cancel_navigation(&tr);
                }
            }
        })
        .continue_with({
            let (tr, top) = (tr.clone(), top.clone());
            move |b| {
                for slot in &top {
                    slot.unload(&tr, b);
                }
            }
        })
        .continue_with({
            let (tr, top) = (tr.clone(), top.clone());
            move |b| {
                for slot in &top {
                    slot.load(&tr, b);
                }
            }
        })
        .continue_with({
            let (tr, top) = (tr.clone(), top.clone());
            move |b| {
                for slot in &top {
                    slot.swap(&tr, b);
                }
            }
        })
        .continue_with({
            let (this, tr) = (Arc::clone(self), tr.clone());
            move |_| this.finish_transition(&tr, next_tree)
        });
        chain.begin();

        // 排空异步钩子;错误会让流水线停摆在当前阶段,此处统一善后。
        self.scheduler.drain().await;
        if tr.has_error() {
            self.fail_navigation(&tr);
        }
    }

    /// 收尾阶段:按 Transition 的最终形态分派到提交/取消/失败。
    fn finish_transition(self: &Arc<Self>, tr: &Transition, next_tree: RouteTree) {
        if tr.has_error() {
            // 善后交给 run_transition 的排空后检查。
            return;
        }
        if !tr.guards_allow() {
            self.cancel_navigation(tr);
            return;
        }
        for slot in self.ctx.slots() {
            slot.end_transition(tr);
        }
        let navigated = tr.changed();
        {
            let mut st = self.state.lock();
            st.current_tree = next_tree;
            st.current_instructions = Some(tr.instructions().clone());
        }
        self.commit_history(tr);
        tr.resolve(navigated);
        info!(transition = tr.id(), navigated, "navigation committed");
        self.events.publish(RouterEvent::NavigationEnd {
            id: tr.id(),
            instructions: tr.instructions().clone(),
            navigated,
        });
    }

    /// 取消在途导航:回滚全树簿记,然后按裁决分派取消或重定向。恰好执行一次。
    fn cancel_navigation(self: &Arc<Self>, tr: &Transition) {
        if !tr.mark_cancelled() {
            return;
        }
        for slot in self.ctx.slots() {
            slot.cancel_update();
        }
        match tr.guards_result() {
            GuardVerdict::Redirect(instructions) => {
                info!(
                    transition = tr.id(),
                    to = %instructions.to_path(),
                    "navigation redirected"
                );
                self.events.publish(RouterEvent::NavigationCancel {
                    id: tr.id(),
                    instructions: tr.instructions().clone(),
                });
                // 结果通道随重定向转移,原调用方随后继导航的结局兑现。
                let senders = tr.take_senders();
                self.enqueue(tr.trigger(), instructions, tr.options(), senders);
            }
            _ => {
                info!(transition = tr.id(), "navigation cancelled");
                self.rollback_history(tr);
                tr.resolve(false);
                self.events.publish(RouterEvent::NavigationCancel {
                    id: tr.id(),
                    instructions: tr.instructions().clone(),
                });
            }
        }
    }

    /// 错误善后:结果通道已在 `handle_error` 时 reject,此处回滚簿记并发布事件。
    fn fail_navigation(self: &Arc<Self>, tr: &Transition) {
        let Some(error) = tr.error() else { return };
        warn!(transition = tr.id(), %error, "navigation failed");
        for slot in self.ctx.slots() {
            slot.cancel_update();
        }
        self.rollback_history(tr);
        self.events.publish(RouterEvent::NavigationError {
            id: tr.id(),
            error,
        });
    }

    fn commit_history(&self, tr: &Transition) {
        let Some(history) = &self.history else { return };
        match (tr.options().history, tr.trigger()) {
            (HistoryStrategy::None, _) => {}
            // 浏览器触发的导航,地址栏已是目标地址。
            (_, NavigationTrigger::PopState | NavigationTrigger::HashChange) => {}
            (HistoryStrategy::Push, NavigationTrigger::Api) => {
                history.push(&tr.instructions().to_path());
            }
            (HistoryStrategy::Replace, NavigationTrigger::Api) => {
                history.replace(&tr.instructions().to_path());
            }
        }
    }

    /// 浏览器触发的导航被取消/出错时,把地址栏恢复为已提交状态。
    fn rollback_history(&self, tr: &Transition) {
        let Some(history) = &self.history else { return };
        if !matches!(
            tr.trigger(),
            NavigationTrigger::PopState | NavigationTrigger::HashChange
        ) {
            return;
        }
        let committed = self
            .state
            .lock()
            .current_instructions
            .as_ref()
            .map(|i| i.to_path())
            .unwrap_or_default();
        history.replace(&committed);
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.state.lock();
        f.debug_struct("Router")
            .field("options", &self.options)
            .field("driving", &st.driving)
            .field("pending", &st.pending.is_some())
            .finish()
    }
}
