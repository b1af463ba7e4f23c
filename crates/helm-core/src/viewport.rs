//! # viewport 模块：视口代理状态机
//!
//! ## 核心意图（Why）
//! - 每个物理视口槽位对应一个常驻代理：它同时跟踪"现任"（curr）与"候任"（next）
//!   两条独立的小状态机，在一次导航内把宿主组件推过
//!   canUnload → canLoad → unload → load → swap 流水线；
//! - 两条状态机只进不退：next 侧在 `end_transition` 归零，curr 侧成功后由晋升的
//!   next 值整体取代。代理随槽位存续，跨越多次导航。
//!
//! ## 状态机约束（What）
//! - curr 侧合法序列：`IsEmpty → IsActive → CanUnload → CanUnloadDone → Unload →
//!   UnloadDone → Deactivate → IsEmpty`；
//! - next 侧合法序列：`IsEmpty → IsScheduled → CanLoad → CanLoadDone → Load →
//!   LoadDone → Activate →（晋升后）IsEmpty`；
//! - 任何方法在非预期源状态被调用即刻 panic（`unexpected_state`）——这是刻意的
//!   fail-fast 契约：流水线顺序不变量绝不允许被静默破坏；
//! - 同一时刻至多一个 Transition 驱动一个代理（绑定检查）。
//!
//! ## 遍历方向（How）
//! - `can_unload` / `unload` / 反激活：自底向上（先后代、再本级）；
//! - `can_load` / `load` / 激活：自顶向下（先本级、再后代）；
//! - 每一级都用嵌套 Batch 表达"后代阶段完成后才进入本级阶段"（或反向），
//!   运行期经残余补解析发现的新后代借助 Batch 的动态 push/pop 自然汇入。

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::batch::Batch;
use crate::component::{ComponentAgent, ComponentAgentRef};
use crate::context::RouteContext;
use crate::error::HelmError;
use crate::hook::HookResult;
use crate::instruction::ComponentKind;
use crate::node::{ReentryBehavior, RouteNode, merge_by_viewport};
use crate::router::{ResolutionMode, SwapOrder};
use crate::scheduler::Scheduler;
use crate::transition::Transition;

/// 现任侧状态。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CurrState {
    /// 槽位空置。
    IsEmpty,
    /// 现任组件安坐。
    IsActive,
    /// 正在征询卸载许可。
    CanUnload,
    /// 卸载许可阶段完成。
    CanUnloadDone,
    /// 正在执行卸载钩子。
    Unload,
    /// 卸载钩子完成。
    UnloadDone,
    /// 已反激活，等待导航收尾。
    Deactivate,
}

/// 候任侧状态。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NextState {
    /// 无候任。
    IsEmpty,
    /// 已排程，流水线未触及。
    IsScheduled,
    /// 正在征询加载许可。
    CanLoad,
    /// 加载许可阶段完成。
    CanLoadDone,
    /// 正在执行加载钩子。
    Load,
    /// 加载钩子完成。
    LoadDone,
    /// 已激活，等待晋升。
    Activate,
}

/// 跃迁计划：本次导航对该视口的处置方式。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TransitionPlan {
    /// 组件与参数均未变：钩子全免，仅递归后代。
    #[default]
    None,
    /// 组件保留、参数有变：重放生命周期钩子，不动激活状态。
    InvokeLifecycles,
    /// 整体替换：现任全拆、候任全建。
    Replace,
}

struct AgentState {
    curr: CurrState,
    next: NextState,
    curr_node: Option<RouteNode>,
    next_node: Option<RouteNode>,
    curr_ca: Option<ComponentAgentRef>,
    next_ca: Option<ComponentAgentRef>,
    plan: TransitionPlan,
    transition_id: Option<u64>,
}

impl AgentState {
    fn resting() -> Self {
        Self {
            curr: CurrState::IsEmpty,
            next: NextState::IsEmpty,
            curr_node: None,
            next_node: None,
            curr_ca: None,
            next_ca: None,
            plan: TransitionPlan::None,
            transition_id: None,
        }
    }
}

/// 视口槽：一个物理槽位的常驻代理与其子上下文。
///
/// # 教案式说明
/// - **意图 (Why)**：槽位由 [`RouteContext::register_viewport`] 显式登记、显式注销，
///   生命周期归属主上下文所有；
/// - **契约 (What)**：`child_context` 承载宿主组件模板内嵌套的视口；路由节点的
///   子节点按视口名落位到该子上下文；
/// - **风险 (Trade-offs)**：子上下文按槽位而非按组件实例划分——新旧组件共用
///   同一命名空间，宿主层应在组件更换时同步登记/注销其模板视口。
pub struct ViewportSlot {
    viewport: String,
    owner: String,
    child_ctx: Arc<RouteContext>,
    agent: Mutex<AgentState>,
}

impl ViewportSlot {
    pub(crate) fn new(viewport: String, owner: String) -> Arc<Self> {
        let child_ctx = RouteContext::child(format!("{owner}/{viewport}"));
        Arc::new(Self {
            viewport,
            owner,
            child_ctx,
            agent: Mutex::new(AgentState::resting()),
        })
    }

    /// 视口名。
    pub fn viewport_name(&self) -> &str {
        &self.viewport
    }

    /// 嵌套视口的子上下文。
    pub fn child_context(&self) -> &Arc<RouteContext> {
        &self.child_ctx
    }

    /// 现任组件类型（若有）。
    pub fn current_kind(&self) -> Option<ComponentKind> {
        self.agent
            .lock()
            .curr_ca
            .as_ref()
            .map(|ca| ca.lock().kind())
    }

    /// 现任节点快照（若有）。
    pub fn current_node(&self) -> Option<RouteNode> {
        self.agent.lock().curr_node.clone()
    }

    /// 两侧状态快照（测试与诊断用）。
    pub fn states(&self) -> (CurrState, NextState) {
        let st = self.agent.lock();
        (st.curr, st.next)
    }

    /// 当前绑定的导航序号（若有）。
    pub fn bound_transition(&self) -> Option<u64> {
        self.agent.lock().transition_id
    }

    fn is_bound_to(&self, tr: &Transition) -> bool {
        self.agent.lock().transition_id == Some(tr.id())
    }

    fn next_is_empty(&self) -> bool {
        matches!(self.agent.lock().next, NextState::IsEmpty)
    }

    #[track_caller]
    fn unexpected_state(&self, op: &str, st: &AgentState) -> ! {
        panic!(
            "viewport `{}` (ctx `{}`): unexpected state during {}: curr={:?} next={:?} plan={:?}",
            self.viewport, self.owner, op, st.curr, st.next, st.plan
        );
    }

    fn bind(&self, st: &mut AgentState, tr: &Transition, op: &str) {
        match st.transition_id {
            None => st.transition_id = Some(tr.id()),
            Some(id) if id == tr.id() => {}
            Some(_) => self.unexpected_state(op, st),
        }
    }

    // ---------------------------------------------------------------- 排程

    /// 计算本次导航对该槽位的跃迁计划并绑定 Transition。
    ///
    /// # 教案式注释
    /// - **意图 (Why)**：计划在流水线启动前一次性定型，之后各阶段据此裁剪钩子；
    /// - **契约 (What)**：
    ///   - `next_node = None` 表示纯移除：现任（若有）整体拆除；
    ///   - 组件类型不同 ⇒ `Replace`；同型则按节点的复用策略裁决；
    ///   - 计划不为 `None` 时在 Transition 上标记"有实际变更"；
    ///   - **前置条件**：next 侧为空、curr 侧安坐（或空置），否则视为引擎缺陷
    ///     立即 panic；
    /// - **执行 (How)**：组件保留（none / invoke-lifecycles）时，子层差分此刻
    ///   即可排程；整体替换的子层要等候任组件在 `canLoad` 阶段就位后再排程。
    pub(crate) fn schedule_update(self: &Arc<Self>, tr: &Transition, next_node: Option<RouteNode>) {
        let (plan, retained_children) = {
            let mut st = self.agent.lock();
            self.bind(&mut st, tr, "scheduleUpdate");
            if !matches!(st.next, NextState::IsEmpty) {
                self.unexpected_state("scheduleUpdate", &st);
            }
            match next_node {
                None => {
                    if !matches!(st.curr, CurrState::IsEmpty | CurrState::IsActive) {
                        self.unexpected_state("scheduleUpdate", &st);
                    }
                    let plan = if st.curr_ca.is_some() {
                        TransitionPlan::Replace
                    } else {
                        TransitionPlan::None
                    };
                    st.plan = plan;
                    (plan, None)
                }
                Some(node) => {
                    // 被替换父级的子槽在 canUnload 阶段已进入拆除流程;此时为其
                    // 挂上候任侧属于合法路径,且现任实例绝不跨父级复用。
                    let teardown_under_way =
                        !matches!(st.curr, CurrState::IsEmpty | CurrState::IsActive);
                    if matches!(st.curr, CurrState::Deactivate) {
                        self.unexpected_state("scheduleUpdate", &st);
                    }
                    let plan = if teardown_under_way {
                        TransitionPlan::Replace
                    } else {
                        Self::compute_plan(&st, &node)
                    };
                    st.next = NextState::IsScheduled;
                    st.plan = plan;
                    let retained = match plan {
                        TransitionPlan::Replace => None,
                        TransitionPlan::None | TransitionPlan::InvokeLifecycles => Some((
                            st.curr_node
                                .as_ref()
                                .map(|n| n.children.clone())
                                .unwrap_or_default(),
                            node.children.clone(),
                        )),
                    };
                    st.next_node = Some(node);
                    (plan, retained)
                }
            }
        };
        debug!(
            transition = tr.id(),
            viewport = %self.viewport,
            plan = ?plan,
            "scheduleUpdate"
        );
        if plan != TransitionPlan::None {
            tr.mark_changed();
        }
        // 组件保留：子层差分立即排程（深度优先展开静态已知的部分）。
        if let Some((prev_children, next_children)) = retained_children {
            for (name, _, next) in merge_by_viewport(&prev_children, &next_children) {
                match self.child_ctx.slot(name) {
                    Some(child) => child.schedule_update(tr, next.cloned()),
                    None => tr.handle_error(HelmError::ViewportNotFound {
                        viewport: name.to_owned(),
                        context: self.child_ctx.name().to_owned(),
                    }),
                }
            }
        }
    }

    fn compute_plan(st: &AgentState, node: &RouteNode) -> TransitionPlan {
        let curr_kind = st.curr_ca.as_ref().map(|ca| ca.lock().kind());
        match curr_kind {
            None => TransitionPlan::Replace,
            Some(kind) if kind != node.component => TransitionPlan::Replace,
            Some(_) => match node.reentry {
                ReentryBehavior::Replace => TransitionPlan::Replace,
                ReentryBehavior::InvokeLifecycles => TransitionPlan::InvokeLifecycles,
                ReentryBehavior::None => TransitionPlan::None,
                ReentryBehavior::Default => {
                    let same_params = st
                        .curr_node
                        .as_ref()
                        .map(|curr| curr.params == node.params)
                        .unwrap_or(false);
                    if same_params {
                        TransitionPlan::None
                    } else {
                        TransitionPlan::InvokeLifecycles
                    }
                }
            },
        }
    }

    // ---------------------------------------------------------- 守卫阶段

    /// 卸载许可：自底向上征询现任子树。
    pub(crate) fn can_unload(self: &Arc<Self>, tr: &Transition, b: &Batch) {
        if !tr.guards_allow() || tr.has_error() {
            return;
        }
        {
            let mut st = self.agent.lock();
            match st.curr {
                CurrState::IsEmpty => return,
                CurrState::IsActive => {
                    // 被替换父级递归而来、尚未排程的后代：隐式加入本次导航（整体拆除）。
                    if st.transition_id.is_none() {
                        st.transition_id = Some(tr.id());
                        st.plan = TransitionPlan::Replace;
                    } else if st.transition_id != Some(tr.id()) {
                        self.unexpected_state("canUnload", &st);
                    }
                    st.curr = CurrState::CanUnload;
                }
                _ => self.unexpected_state("canUnload", &st),
            }
        }
        trace!(transition = tr.id(), viewport = %self.viewport, "canUnload");
        b.push();
        let children = self.child_ctx.slots();
        let tr1 = tr.clone();
        let (this, tr2) = (Arc::clone(self), tr.clone());
        let bout = b.clone();
        Batch::start(move |b1| {
            for child in &children {
                child.can_unload(&tr1, b1);
            }
        })
        .continue_with(move |b1| this.can_unload_local(&tr2, b1))
        .continue_with(move |_| bout.pop())
        .begin();
    }

    fn can_unload_local(self: &Arc<Self>, tr: &Transition, b1: &Batch) {
        let (plan, ca, next_node) = {
            let st = self.agent.lock();
            (st.plan, st.curr_ca.clone(), st.next_node.clone())
        };
        match (plan, ca) {
            (TransitionPlan::None, _) | (_, None) => {
                self.agent.lock().curr = CurrState::CanUnloadDone;
            }
            (TransitionPlan::InvokeLifecycles | TransitionPlan::Replace, Some(ca)) => {
                b1.push();
                let (this, tr2) = (Arc::clone(self), tr.clone());
                let b1c = b1.clone();
                Batch::start(move |b2| {
                    ca.lock().can_unload(&tr2, next_node.as_ref(), b2);
                })
                .continue_with(move |_| {
                    this.agent.lock().curr = CurrState::CanUnloadDone;
                    b1c.pop();
                })
                .begin();
            }
        }
    }

    /// 加载许可：自顶向下征询候任子树；`Replace` 计划在此就位候任组件；
    /// 动态解析模式下补解析残余，运行期发现新的后代。
    pub(crate) fn can_load(self: &Arc<Self>, tr: &Transition, b: &Batch) {
        if !tr.guards_allow() || tr.has_error() {
            return;
        }
        {
            let mut st = self.agent.lock();
            match st.next {
                NextState::IsEmpty => return,
                NextState::IsScheduled => {
                    if st.transition_id != Some(tr.id()) {
                        self.unexpected_state("canLoad", &st);
                    }
                    st.next = NextState::CanLoad;
                }
                _ => self.unexpected_state("canLoad", &st),
            }
        }
        trace!(transition = tr.id(), viewport = %self.viewport, "canLoad");
        let (plan, node) = {
            let st = self.agent.lock();
            let node = st
                .next_node
                .clone()
                .unwrap_or_else(|| self.unexpected_state("canLoad", &st));
            (st.plan, node)
        };
        // 候任组件就位：替换计划经工厂实例化，其余复用现任实例。
        match plan {
            TransitionPlan::Replace => match tr.factory().create(&node) {
                Ok(handle) => {
                    self.agent.lock().next_ca = Some(ComponentAgent::shared(handle));
                }
                Err(error) => {
                    tr.handle_error(error);
                    return;
                }
            },
            TransitionPlan::None | TransitionPlan::InvokeLifecycles => {
                let mut st = self.agent.lock();
                st.next_ca = st.curr_ca.clone();
            }
        }
        b.push();
        let (this, tr1) = (Arc::clone(self), tr.clone());
        let (this2, tr2) = (Arc::clone(self), tr.clone());
        let (this3, tr3) = (Arc::clone(self), tr.clone());
        let this4 = Arc::clone(self);
        let bout = b.clone();
        Batch::start(move |b1| {
            if plan != TransitionPlan::None {
                let ca = this.agent.lock().next_ca.clone();
                if let Some(ca) = ca {
                    ca.lock().can_load(&tr1, &node, b1);
                }
            }
        })
        .continue_with(move |b1| this2.compile_residue(&tr2, b1))
        .continue_with(move |b1| {
            let children = this3
                .agent
                .lock()
                .next_node
                .as_ref()
                .map(|n| n.children.clone())
                .unwrap_or_default();
            for child_node in children {
                this3.schedule_and_can_load_child(&tr3, child_node, b1);
            }
        })
        .continue_with(move |_| {
            // 锁必须先释放:pop 级联可能就地引爆下游阶段并回到本槽。
            {
                let mut st = this4.agent.lock();
                if matches!(st.next, NextState::CanLoad) {
                    st.next = NextState::CanLoadDone;
                }
            }
            bout.pop();
        })
        .begin();
    }

    fn schedule_and_can_load_child(
        self: &Arc<Self>,
        tr: &Transition,
        child_node: RouteNode,
        b1: &Batch,
    ) {
        match self.child_ctx.slot(&child_node.viewport) {
            Some(child) => {
                // 组件保留的父级在排程时已展开子层差分（候任侧已就绪）；
                // 被替换父级的子槽此刻才拿到候任节点。
                if child.next_is_empty() {
                    child.schedule_update(tr, Some(child_node));
                }
                child.can_load(tr, b1);
            }
            None => tr.handle_error(HelmError::ViewportNotFound {
                viewport: child_node.viewport.clone(),
                context: self.child_ctx.name().to_owned(),
            }),
        }
    }

    /// 补解析候任节点上的残余指令（仅动态解析模式）。
    fn compile_residue(self: &Arc<Self>, tr: &Transition, b1: &Batch) {
        if tr.options().resolution != ResolutionMode::Dynamic {
            return;
        }
        let node = {
            let st = self.agent.lock();
            match st.next_node.as_ref() {
                Some(n) if !n.residue.is_empty() => n.clone(),
                _ => return,
            }
        };
        trace!(transition = tr.id(), viewport = %self.viewport, residue = node.residue.len(), "compile residue");
        let resolver = Arc::clone(tr.resolver());
        let this = Arc::clone(self);
        let bp = b1.clone();
        let bk = b1.clone();
        tr.run(
            move || {
                bp.push();
                HookResult::pending(async move { resolver.resolve_residue(&node).await })
            },
            move |new_children| {
                // 只登记补解析产物；随后的子层阶段统一排程并递归，
                // 避免同一子槽被二次触发。
                {
                    let mut st = this.agent.lock();
                    if let Some(n) = st.next_node.as_mut() {
                        n.residue.clear();
                        n.children.extend(new_children);
                    }
                }
                bk.pop();
            },
        );
    }

    // -------------------------------------------------------- 副作用阶段

    /// 卸载：自底向上，守卫全树放行后才会到达。
    pub(crate) fn unload(self: &Arc<Self>, tr: &Transition, b: &Batch) {
        if !tr.guards_allow() || tr.has_error() || !self.is_bound_to(tr) {
            return;
        }
        {
            let mut st = self.agent.lock();
            match st.curr {
                CurrState::IsEmpty => return,
                CurrState::CanUnloadDone => st.curr = CurrState::Unload,
                _ => self.unexpected_state("unload", &st),
            }
        }
        trace!(transition = tr.id(), viewport = %self.viewport, "unload");
        b.push();
        let children = self.child_ctx.slots();
        let tr1 = tr.clone();
        let (this, tr2) = (Arc::clone(self), tr.clone());
        let bout = b.clone();
        Batch::start(move |b1| {
            for child in &children {
                child.unload(&tr1, b1);
            }
        })
        .continue_with(move |b1| {
            let (plan, ca, next_node) = {
                let st = this.agent.lock();
                (st.plan, st.curr_ca.clone(), st.next_node.clone())
            };
            match (plan, ca) {
                (TransitionPlan::None, _) | (_, None) => {
                    this.agent.lock().curr = CurrState::UnloadDone;
                }
                (TransitionPlan::InvokeLifecycles | TransitionPlan::Replace, Some(ca)) => {
                    b1.push();
                    let this2 = Arc::clone(&this);
                    let tr3 = tr2.clone();
                    let b1c = b1.clone();
                    Batch::start(move |b2| {
                        ca.lock().unload(&tr3, next_node.as_ref(), b2);
                    })
                    .continue_with(move |_| {
                        this2.agent.lock().curr = CurrState::UnloadDone;
                        b1c.pop();
                    })
                    .begin();
                }
            }
        })
        .continue_with(move |_| bout.pop())
        .begin();
    }

    /// 加载：自顶向下，镜像 `can_load` 的遍历顺序。
    pub(crate) fn load(self: &Arc<Self>, tr: &Transition, b: &Batch) {
        if !tr.guards_allow() || tr.has_error() || !self.is_bound_to(tr) {
            return;
        }
        {
            let mut st = self.agent.lock();
            match st.next {
                NextState::IsEmpty => return,
                NextState::CanLoadDone => st.next = NextState::Load,
                _ => self.unexpected_state("load", &st),
            }
        }
        trace!(transition = tr.id(), viewport = %self.viewport, "load");
        b.push();
        let (this, tr1) = (Arc::clone(self), tr.clone());
        let (this2, tr2) = (Arc::clone(self), tr.clone());
        let this3 = Arc::clone(self);
        let bout = b.clone();
        Batch::start(move |b1| {
            let (plan, ca, node) = {
                let st = this.agent.lock();
                (st.plan, st.next_ca.clone(), st.next_node.clone())
            };
            if plan != TransitionPlan::None
                && let (Some(ca), Some(node)) = (ca, node)
            {
                ca.lock().load(&tr1, &node, b1);
            }
        })
        .continue_with(move |b1| {
            for child in this2.child_ctx.slots() {
                child.load(&tr2, b1);
            }
        })
        .continue_with(move |_| {
            // 同 canLoad 收尾:持锁 pop 会在级联重入本槽时死锁。
            {
                let mut st = this3.agent.lock();
                if matches!(st.next, NextState::Load) {
                    st.next = NextState::LoadDone;
                }
            }
            bout.pop();
        })
        .begin();
    }

    // ------------------------------------------------------------- swap

    /// 激活/反激活编排：按配置的交换顺序推进，单侧为空时退化为纯激活或纯反激活。
    pub(crate) fn swap(self: &Arc<Self>, tr: &Transition, b: &Batch) {
        if !tr.guards_allow() || tr.has_error() || !self.is_bound_to(tr) {
            return;
        }
        let (plan, curr_ready, next_ready) = {
            let st = self.agent.lock();
            (
                st.plan,
                matches!(st.curr, CurrState::UnloadDone),
                matches!(st.next, NextState::LoadDone),
            )
        };
        match plan {
            TransitionPlan::None | TransitionPlan::InvokeLifecycles => {
                // 组件不更换：仅递归后代（后代可能各自处于替换计划）。
                b.push();
                let children = self.child_ctx.slots();
                let tr1 = tr.clone();
                let bout = b.clone();
                Batch::start(move |b1| {
                    for child in &children {
                        child.swap(&tr1, b1);
                    }
                })
                .continue_with(move |_| bout.pop())
                .begin();
            }
            TransitionPlan::Replace => match (curr_ready, next_ready) {
                (false, false) => {}
                (true, false) => self.deactivate_subtree(tr, b),
                (false, true) => self.activate_subtree(tr, b),
                (true, true) => self.swap_both(tr, b),
            },
        }
    }

    fn swap_both(self: &Arc<Self>, tr: &Transition, b: &Batch) {
        trace!(transition = tr.id(), viewport = %self.viewport, order = ?tr.options().swap_order, "swap");
        b.push();
        let bout = b.clone();
        match tr.options().swap_order {
            SwapOrder::SequentialAddFirst => {
                let (this1, tr1) = (Arc::clone(self), tr.clone());
                let (this2, tr2) = (Arc::clone(self), tr.clone());
                Batch::start(move |b1| this1.activate_subtree(&tr1, b1))
                    .continue_with(move |b1| this2.deactivate_subtree(&tr2, b1))
                    .continue_with(move |_| bout.pop())
                    .begin();
            }
            SwapOrder::SequentialRemoveFirst => {
                let (this1, tr1) = (Arc::clone(self), tr.clone());
                let (this2, tr2) = (Arc::clone(self), tr.clone());
                Batch::start(move |b1| this1.deactivate_subtree(&tr1, b1))
                    .continue_with(move |b1| this2.activate_subtree(&tr2, b1))
                    .continue_with(move |_| bout.pop())
                    .begin();
            }
            SwapOrder::ParallelRemoveFirst => {
                let (this1, tr1) = (Arc::clone(self), tr.clone());
                let this2 = Arc::clone(self);
                Batch::start(move |b1| {
                    // 并行：两侧同批发起、各自独立完成；移除侧先行发起。
                    this1.deactivate_subtree(&tr1, b1);
                    this2.activate_subtree(&tr1, b1);
                })
                .continue_with(move |_| bout.pop())
                .begin();
            }
        }
    }

    /// 反激活现任子树：先后代、再本级钩子。
    fn deactivate_subtree(self: &Arc<Self>, tr: &Transition, b: &Batch) {
        {
            let mut st = self.agent.lock();
            match st.curr {
                CurrState::IsEmpty => return,
                CurrState::UnloadDone => st.curr = CurrState::Deactivate,
                _ => self.unexpected_state("deactivate", &st),
            }
        }
        b.push();
        let children = self.child_ctx.slots();
        let tr1 = tr.clone();
        let (this, tr2) = (Arc::clone(self), tr.clone());
        let bout = b.clone();
        Batch::start(move |b1| {
            for child in &children {
                child.deactivate_subtree(&tr1, b1);
            }
        })
        .continue_with(move |b1| {
            let ca = this.agent.lock().curr_ca.clone();
            if let Some(ca) = ca {
                ca.lock().deactivate(&tr2, b1);
            }
        })
        .continue_with(move |_| bout.pop())
        .begin();
    }

    /// 激活候任子树：先本级钩子、再后代。
    fn activate_subtree(self: &Arc<Self>, tr: &Transition, b: &Batch) {
        {
            let mut st = self.agent.lock();
            match st.next {
                NextState::IsEmpty => return,
                NextState::LoadDone => st.next = NextState::Activate,
                _ => self.unexpected_state("activate", &st),
            }
        }
        b.push();
        let (this, tr1) = (Arc::clone(self), tr.clone());
        let (this2, tr2) = (Arc::clone(self), tr.clone());
        let bout = b.clone();
        Batch::start(move |b1| {
            let ca = this.agent.lock().next_ca.clone();
            if let Some(ca) = ca {
                ca.lock().activate(&tr1, b1);
            }
        })
        .continue_with(move |b1| {
            for child in this2.child_ctx.slots() {
                child.activate_subtree(&tr2, b1);
            }
        })
        .continue_with(move |_| bout.pop())
        .begin();
    }

    // ------------------------------------------------------------- 收尾

    /// 成功收尾：深度优先晋升候任、清空 next 侧、解除 Transition 绑定。
    ///
    /// 绑定检查保证每个代理每次导航至多收尾一次；未被本次导航触及的槽位
    /// 直接跳过。
    pub(crate) fn end_transition(self: &Arc<Self>, tr: &Transition) {
        for child in self.child_ctx.slots() {
            child.end_transition(tr);
        }
        let mut st = self.agent.lock();
        if st.transition_id != Some(tr.id()) {
            return;
        }
        match st.curr {
            CurrState::Deactivate => {
                st.curr_ca = None;
                st.curr_node = None;
                st.curr = CurrState::IsEmpty;
            }
            CurrState::UnloadDone => st.curr = CurrState::IsActive,
            CurrState::IsEmpty => {}
            _ => self.unexpected_state("endTransition", &st),
        }
        match st.next {
            NextState::Activate | NextState::LoadDone => {
                st.curr_ca = st.next_ca.take();
                st.curr_node = st.next_node.take();
                st.curr = CurrState::IsActive;
                st.next = NextState::IsEmpty;
            }
            NextState::IsEmpty => {
                st.next_ca = None;
                st.next_node = None;
            }
            _ => self.unexpected_state("endTransition", &st),
        }
        st.plan = TransitionPlan::None;
        st.transition_id = None;
        debug!(transition = tr.id(), viewport = %self.viewport, curr = ?st.curr, "endTransition");
    }

    /// 取消回滚：深度优先把尚未走到激活/反激活的代理复位到导航前的安坐状态。
    ///
    /// 已完成的钩子副作用不做补偿（记录在案的开放语义）；此处只复位簿记，
    /// 保证代理对下一次（替代）导航立即可用。
    pub(crate) fn cancel_update(self: &Arc<Self>) {
        for child in self.child_ctx.slots() {
            child.cancel_update();
        }
        let mut st = self.agent.lock();
        if st.transition_id.is_none() {
            return;
        }
        debug!(viewport = %self.viewport, curr = ?st.curr, next = ?st.next, "cancelUpdate");
        st.curr = if st.curr_ca.is_some() {
            CurrState::IsActive
        } else {
            CurrState::IsEmpty
        };
        st.next = NextState::IsEmpty;
        st.next_ca = None;
        st.next_node = None;
        st.plan = TransitionPlan::None;
        st.transition_id = None;
    }

    // ----------------------------------------------- 宿主层直达入口

    /// 宿主元素 attach（与导航无关）：为现任组件补发 activate 钩子。
    ///
    /// 槽位处于在途导航中时为空操作——激活将由流水线自身完成。
    pub fn activate_from_viewport(&self, scheduler: &Scheduler) {
        let ca = {
            let st = self.agent.lock();
            if st.transition_id.is_some() {
                return;
            }
            st.curr_ca.clone()
        };
        if let Some(ca) = ca {
            ca.lock().activate_detached(scheduler);
        }
    }

    /// 宿主元素 detach（与导航无关）：为现任组件补发 deactivate 钩子。
    pub fn deactivate_from_viewport(&self, scheduler: &Scheduler) {
        let ca = {
            let st = self.agent.lock();
            if st.transition_id.is_some() {
                return;
            }
            st.curr_ca.clone()
        };
        if let Some(ca) = ca {
            ca.lock().deactivate_detached(scheduler);
        }
    }
}

impl std::fmt::Debug for ViewportSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.agent.lock();
        f.debug_struct("ViewportSlot")
            .field("viewport", &self.viewport)
            .field("owner", &self.owner)
            .field("curr", &st.curr)
            .field("next", &st.next)
            .field("plan", &st.plan)
            .finish()
    }
}
