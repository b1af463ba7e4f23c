//! 导航场景测试:以可观察探针组件驱动完整流水线,断言钩子顺序、结果兑现、
//! 事件流与状态机归位。
//!
//! 全部场景以 `futures::executor::block_on` 驱动,不绑定具体运行时。

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::executor::block_on;
use parking_lot::Mutex;

use helm_core::{
    Component, ComponentFactory, ComponentHandle, ComponentKind, CurrState, GuardVerdict,
    HelmError, HistoryAdapter, HookResult, InstructionParser, InstructionTree, Lifecycle,
    NavigationInstruction, NavigationTrigger, NextState, ResolutionMode, RouteNode, RouteTree,
    RouteTreeResolver, Router, RouterEvent, RouterOptions, SwapOrder,
};

const HOME: ComponentKind = ComponentKind("home");
const ABOUT: ComponentKind = ComponentKind("about");
const LOGIN: ComponentKind = ComponentKind("login");
const BLOG: ComponentKind = ComponentKind("blog");
const CONTACT: ComponentKind = ComponentKind("contact");
const HOME_SHELL: ComponentKind = ComponentKind("home-shell");
const HOME_CHILD: ComponentKind = ComponentKind("home-child");
const ABOUT_SHELL: ComponentKind = ComponentKind("about-shell");
const ABOUT_CHILD: ComponentKind = ComponentKind("about-child");

/// 按组件名配置的钩子行为;组件在每次钩子调用时实时读取,允许测试中途改写。
#[derive(Clone, Default)]
struct HookPlan {
    can_load: Option<GuardVerdict>,
    fail_can_load: bool,
    async_can_load: bool,
    block_unload: bool,
}

struct TestEnv {
    log: Mutex<Vec<String>>,
    plans: Mutex<HashMap<&'static str, HookPlan>>,
}

impl TestEnv {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            log: Mutex::new(Vec::new()),
            plans: Mutex::new(HashMap::new()),
        })
    }

    fn record(&self, entry: String) {
        self.log.lock().push(entry);
    }

    fn plan(&self, kind: &str) -> HookPlan {
        self.plans.lock().get(kind).cloned().unwrap_or_default()
    }

    fn set_plan(&self, kind: &'static str, plan: HookPlan) {
        self.plans.lock().insert(kind, plan);
    }

    fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.lock())
    }
}

/// 完成前让出一次的 Future:迫使调度器真正经历一次挂起/唤醒往返。
struct YieldOnce(bool);

impl YieldOnce {
    fn new() -> Self {
        Self(false)
    }
}

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

/// 探针组件:每个钩子调用记一条日志,行为由 [`HookPlan`] 实时裁决。
struct Probe {
    kind: ComponentKind,
    env: Arc<TestEnv>,
}

impl Lifecycle for Probe {
    fn can_load(&mut self, _next: &RouteNode) -> HookResult<GuardVerdict> {
        self.env.record(format!("{}:canLoad", self.kind));
        let plan = self.env.plan(self.kind.0);
        if plan.fail_can_load {
            return HookResult::err(HelmError::Hook {
                component: self.kind.0.to_owned(),
                hook: "canLoad",
                reason: "probe failure".to_owned(),
            });
        }
        let verdict = plan.can_load.unwrap_or(GuardVerdict::Allow);
        if plan.async_can_load {
            HookResult::pending(async move {
                YieldOnce::new().await;
                Ok(verdict)
            })
        } else {
            HookResult::ok(verdict)
        }
    }

    fn load(&mut self, _next: &RouteNode) -> HookResult<()> {
        self.env.record(format!("{}:load", self.kind));
        HookResult::done()
    }

    fn can_unload(&mut self, _next: Option<&RouteNode>) -> HookResult<bool> {
        self.env.record(format!("{}:canUnload", self.kind));
        HookResult::ok(!self.env.plan(self.kind.0).block_unload)
    }

    fn unload(&mut self, _next: Option<&RouteNode>) -> HookResult<()> {
        self.env.record(format!("{}:unload", self.kind));
        HookResult::done()
    }

    fn activate(&mut self) -> HookResult<()> {
        self.env.record(format!("{}:activate", self.kind));
        HookResult::done()
    }

    fn deactivate(&mut self) -> HookResult<()> {
        self.env.record(format!("{}:deactivate", self.kind));
        HookResult::done()
    }
}

impl Component for Probe {
    fn kind(&self) -> ComponentKind {
        self.kind
    }
}

struct ProbeFactory {
    env: Arc<TestEnv>,
}

impl ComponentFactory for ProbeFactory {
    fn create(&self, node: &RouteNode) -> Result<ComponentHandle, HelmError> {
        if node.component.0 == "broken" {
            return Err(HelmError::Factory {
                component: node.component.0.to_owned(),
                reason: "probe factory refuses".to_owned(),
            });
        }
        self.env.record(format!("create:{}", node.component));
        Ok(ComponentHandle::bare(Box::new(Probe {
            kind: node.component,
            env: Arc::clone(&self.env),
        })))
    }
}

/// 指令 → 节点的一比一解析器;组件名 `missing` 模拟解析失败。
struct EchoResolver;

fn to_node(instruction: &NavigationInstruction) -> RouteNode {
    let mut node = RouteNode::new(instruction.component).in_viewport(instruction.viewport.clone());
    node.params = instruction.params.clone();
    node.children = instruction.children.iter().map(to_node).collect();
    node
}

#[async_trait]
impl RouteTreeResolver for EchoResolver {
    async fn resolve(&self, instructions: &InstructionTree) -> Result<RouteTree, HelmError> {
        fn has_missing(i: &NavigationInstruction) -> bool {
            i.component.0 == "missing" || i.children.iter().any(has_missing)
        }
        if instructions.instructions.iter().any(has_missing) {
            return Err(HelmError::Unresolvable {
                instruction: instructions.to_path(),
                reason: "no route matches `missing`".to_owned(),
            });
        }
        Ok(RouteTree {
            root: instructions.instructions.iter().map(to_node).collect(),
        })
    }
}

/// 动态模式解析器:顶层之下的子指令保留为残余,`canLoad` 阶段补解析。
struct LazyResolver;

#[async_trait]
impl RouteTreeResolver for LazyResolver {
    async fn resolve(&self, instructions: &InstructionTree) -> Result<RouteTree, HelmError> {
        let root = instructions
            .instructions
            .iter()
            .map(|i| {
                let mut node = RouteNode::new(i.component).in_viewport(i.viewport.clone());
                node.params = i.params.clone();
                node.residue = i.children.clone();
                node
            })
            .collect();
        Ok(RouteTree { root })
    }

    async fn resolve_residue(&self, node: &RouteNode) -> Result<Vec<RouteNode>, HelmError> {
        YieldOnce::new().await;
        Ok(node.residue.iter().map(to_node).collect())
    }
}

struct NameParser;

impl InstructionParser for NameParser {
    fn parse(&self, path: &str) -> Result<InstructionTree, HelmError> {
        let component = match path {
            "home" => HOME,
            "about" => ABOUT,
            "login" => LOGIN,
            _ => {
                return Err(HelmError::Unresolvable {
                    instruction: path.to_owned(),
                    reason: "unknown path".to_owned(),
                });
            }
        };
        Ok(InstructionTree::single(NavigationInstruction::new(
            component,
        )))
    }
}

#[derive(Default)]
struct RecordingHistory {
    ops: Mutex<Vec<String>>,
}

/// 本地包装:共享底层记录,测试侧与路由器侧各持一份句柄。
struct HistoryHandle(Arc<RecordingHistory>);

impl HistoryAdapter for HistoryHandle {
    fn push(&self, path: &str) {
        self.0.ops.lock().push(format!("push:{path}"));
    }

    fn replace(&self, path: &str) {
        self.0.ops.lock().push(format!("replace:{path}"));
    }

    fn current_path(&self) -> String {
        self.0
            .ops
            .lock()
            .last()
            .map(|op| op.split(':').nth(1).unwrap_or("").to_owned())
            .unwrap_or_default()
    }
}

/// `HELM_LOG=trace cargo test` 可观察流水线推进;重复初始化静默忽略。
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("HELM_LOG"))
        .with_test_writer()
        .try_init();
}

fn router_with(env: &Arc<TestEnv>, options: RouterOptions) -> Arc<Router> {
    init_tracing();
    Router::builder(
        Arc::new(ProbeFactory {
            env: Arc::clone(env),
        }),
        Arc::new(EchoResolver),
    )
    .options(options)
    .build()
}

fn default_router(env: &Arc<TestEnv>) -> Arc<Router> {
    router_with(env, RouterOptions::default())
}

/// 首次导航:空槽位上激活组件,结果兑现 `Ok(true)`。
#[test]
fn initial_navigation_activates_component() {
    let env = TestEnv::new();
    let router = default_router(&env);
    let slot = router.context().register_viewport("default").unwrap();

    let navigated = block_on(router.load(NavigationInstruction::new(HOME))).unwrap();
    assert!(navigated);
    assert_eq!(slot.current_kind(), Some(HOME));
    assert_eq!(slot.states(), (CurrState::IsActive, NextState::IsEmpty));
    assert_eq!(
        env.take_log(),
        vec!["create:home", "home:canLoad", "home:load", "home:activate"]
    );
}

/// 整体替换走满五个阶段,默认交换顺序先反激活旧件。
#[test]
fn replace_runs_pipeline_stages_in_order() {
    let env = TestEnv::new();
    let router = default_router(&env);
    let slot = router.context().register_viewport("default").unwrap();

    block_on(router.load(NavigationInstruction::new(HOME))).unwrap();
    env.take_log();

    let navigated = block_on(router.load(NavigationInstruction::new(ABOUT))).unwrap();
    assert!(navigated);
    assert_eq!(slot.current_kind(), Some(ABOUT));
    assert_eq!(
        env.take_log(),
        vec![
            "home:canUnload",
            "create:about",
            "about:canLoad",
            "home:unload",
            "about:load",
            "home:deactivate",
            "about:activate",
        ]
    );
}

/// add-first 交换顺序:新件激活完成后才反激活旧件。
#[test]
fn add_first_swap_activates_before_deactivating() {
    let env = TestEnv::new();
    let router = router_with(
        &env,
        RouterOptions {
            swap_order: SwapOrder::SequentialAddFirst,
            ..RouterOptions::default()
        },
    );
    router.context().register_viewport("default").unwrap();

    block_on(router.load(NavigationInstruction::new(HOME))).unwrap();
    env.take_log();
    block_on(router.load(NavigationInstruction::new(ABOUT))).unwrap();

    let log = env.take_log();
    let activate = log.iter().position(|e| e == "about:activate").unwrap();
    let deactivate = log.iter().position(|e| e == "home:deactivate").unwrap();
    assert!(activate < deactivate, "log: {log:?}");
}

/// 单次覆盖配置:`load_with` 只影响本次导航,全局配置保持 remove-first。
#[test]
fn per_call_options_override_a_single_navigation() {
    let env = TestEnv::new();
    let router = default_router(&env);
    router.context().register_viewport("default").unwrap();

    block_on(router.load(NavigationInstruction::new(HOME))).unwrap();
    env.take_log();
    block_on(router.load_with(
        NavigationInstruction::new(ABOUT),
        RouterOptions {
            swap_order: SwapOrder::SequentialAddFirst,
            ..RouterOptions::default()
        },
    ))
    .unwrap();

    let log = env.take_log();
    let activate = log.iter().position(|e| e == "about:activate").unwrap();
    let deactivate = log.iter().position(|e| e == "home:deactivate").unwrap();
    assert!(activate < deactivate, "log: {log:?}");

    // 后续导航回到全局 remove-first。
    block_on(router.load(NavigationInstruction::new(HOME))).unwrap();
    let log = env.take_log();
    let deactivate = log.iter().position(|e| e == "about:deactivate").unwrap();
    let activate = log.iter().position(|e| e == "home:activate").unwrap();
    assert!(deactivate < activate, "log: {log:?}");
}

/// 同址导航:全部跃迁计划为 none,钩子全免,兑现 `Ok(false)`。
#[test]
fn same_instruction_navigation_is_a_noop() {
    let env = TestEnv::new();
    let router = default_router(&env);
    let slot = router.context().register_viewport("default").unwrap();

    block_on(router.load(NavigationInstruction::new(HOME))).unwrap();
    env.take_log();

    let navigated = block_on(router.load(NavigationInstruction::new(HOME))).unwrap();
    assert!(!navigated);
    assert_eq!(env.take_log(), Vec::<String>::new());
    assert_eq!(slot.current_kind(), Some(HOME));
    assert_eq!(slot.states(), (CurrState::IsActive, NextState::IsEmpty));
}

/// 同组件参数变化:重放生命周期钩子但不重建实例,也不触碰激活状态。
#[test]
fn param_change_invokes_lifecycles_without_replacing() {
    let env = TestEnv::new();
    let router = default_router(&env);
    let slot = router.context().register_viewport("default").unwrap();

    block_on(router.load(NavigationInstruction::new(HOME).with_param("id", "1"))).unwrap();
    env.take_log();

    let navigated =
        block_on(router.load(NavigationInstruction::new(HOME).with_param("id", "2"))).unwrap();
    assert!(navigated);
    assert_eq!(
        env.take_log(),
        vec!["home:canUnload", "home:canLoad", "home:unload", "home:load"],
        "无 create、无 activate/deactivate"
    );
    assert_eq!(
        slot.current_node().unwrap().params.get("id").unwrap(),
        "2",
        "晋升后的节点携带新参数"
    );
}

/// canUnload 拒绝:导航兑现 `Ok(false)`,全树回滚到导航前状态。
#[test]
fn guard_cancel_rolls_back_and_resolves_false() {
    let env = TestEnv::new();
    let router = default_router(&env);
    let slot = router.context().register_viewport("default").unwrap();

    block_on(router.load(NavigationInstruction::new(HOME))).unwrap();
    env.take_log();
    env.set_plan(
        "home",
        HookPlan {
            block_unload: true,
            ..HookPlan::default()
        },
    );

    let navigated = block_on(router.load(NavigationInstruction::new(ABOUT))).unwrap();
    assert!(!navigated);
    assert_eq!(env.take_log(), vec!["home:canUnload"], "canLoad 未被发起");
    assert_eq!(slot.current_kind(), Some(HOME));
    assert_eq!(slot.states(), (CurrState::IsActive, NextState::IsEmpty));
    assert!(slot.bound_transition().is_none(), "绑定已解除");
}

/// canLoad 重定向:原导航取消,结果通道随重定向兑现后继导航的结局。
#[test]
fn guard_redirect_settles_caller_with_redirect_outcome() {
    let env = TestEnv::new();
    let router = default_router(&env);
    let slot = router.context().register_viewport("default").unwrap();

    block_on(router.load(NavigationInstruction::new(HOME))).unwrap();
    env.take_log();
    env.set_plan(
        "about",
        HookPlan {
            can_load: Some(GuardVerdict::Redirect(InstructionTree::single(
                NavigationInstruction::new(LOGIN),
            ))),
            ..HookPlan::default()
        },
    );

    let navigated = block_on(router.load(NavigationInstruction::new(ABOUT))).unwrap();
    assert!(navigated, "调用方拿到重定向后继的成功结局");
    assert_eq!(slot.current_kind(), Some(LOGIN));

    let log = env.take_log();
    assert!(log.contains(&"about:canLoad".to_owned()));
    assert!(
        !log.contains(&"about:load".to_owned()),
        "被重定向者不进入副作用阶段"
    );
    assert!(log.contains(&"login:activate".to_owned()));
}

/// 钩子失败:导航 reject,簿记回滚,现任组件安然无恙。
#[test]
fn hook_error_rejects_navigation_and_rolls_back() {
    let env = TestEnv::new();
    let router = default_router(&env);
    let slot = router.context().register_viewport("default").unwrap();

    block_on(router.load(NavigationInstruction::new(HOME))).unwrap();
    env.take_log();
    env.set_plan(
        "about",
        HookPlan {
            fail_can_load: true,
            ..HookPlan::default()
        },
    );

    let err = block_on(router.load(NavigationInstruction::new(ABOUT))).unwrap_err();
    assert!(matches!(err, HelmError::Hook { hook: "canLoad", .. }), "{err:?}");
    assert_eq!(slot.current_kind(), Some(HOME));
    assert_eq!(slot.states(), (CurrState::IsActive, NextState::IsEmpty));
    assert!(!router.is_navigating());
}

/// 挂起的 canLoad 钩子经调度器唤醒后,级联推进余下全部阶段直至提交。
#[test]
fn pending_can_load_hook_resumes_the_pipeline() {
    let env = TestEnv::new();
    let router = default_router(&env);
    let slot = router.context().register_viewport("default").unwrap();

    block_on(router.load(NavigationInstruction::new(HOME))).unwrap();
    env.take_log();
    env.set_plan(
        "about",
        HookPlan {
            async_can_load: true,
            ..HookPlan::default()
        },
    );

    let navigated = block_on(router.load(NavigationInstruction::new(ABOUT))).unwrap();
    assert!(navigated);
    assert_eq!(slot.current_kind(), Some(ABOUT));
    assert_eq!(slot.states(), (CurrState::IsActive, NextState::IsEmpty));
    assert_eq!(
        env.take_log(),
        vec![
            "home:canUnload",
            "create:about",
            "about:canLoad",
            "home:unload",
            "about:load",
            "home:deactivate",
            "about:activate",
        ]
    );
}

/// 工厂失败与解析失败都在进入副作用阶段前 reject。
#[test]
fn factory_and_resolution_failures_reject_early() {
    let env = TestEnv::new();
    let router = default_router(&env);
    router.context().register_viewport("default").unwrap();

    let err = block_on(router.load(NavigationInstruction::new(ComponentKind("missing"))));
    assert!(matches!(err, Err(HelmError::Unresolvable { .. })));
    assert_eq!(env.take_log(), Vec::<String>::new());

    let err = block_on(router.load(NavigationInstruction::new(ComponentKind("broken"))));
    assert!(matches!(err, Err(HelmError::Factory { .. })));
    let log = env.take_log();
    assert!(
        !log.iter().any(|e| e.ends_with(":load")),
        "副作用阶段未启动: {log:?}"
    );
}

/// 指令指向未登记的视口:导航以 `ViewportNotFound` reject。
#[test]
fn unknown_viewport_is_rejected() {
    let env = TestEnv::new();
    let router = default_router(&env);
    router.context().register_viewport("default").unwrap();

    let err = block_on(router.load(NavigationInstruction::new(HOME).in_viewport("sidebar")));
    assert!(matches!(err, Err(HelmError::ViewportNotFound { .. })), "{err:?}");
}

/// 嵌套视口:守卫与卸载自底向上,加载与激活自顶向下。
#[test]
fn nested_viewports_follow_tree_traversal_orders() {
    let env = TestEnv::new();
    let router = default_router(&env);
    let shell_slot = router.context().register_viewport("default").unwrap();
    let child_slot = shell_slot
        .child_context()
        .register_viewport("default")
        .unwrap();

    block_on(router.load(
        NavigationInstruction::new(HOME_SHELL).with_child(NavigationInstruction::new(HOME_CHILD)),
    ))
    .unwrap();
    assert_eq!(child_slot.current_kind(), Some(HOME_CHILD));
    env.take_log();

    block_on(router.load(
        NavigationInstruction::new(ABOUT_SHELL).with_child(NavigationInstruction::new(ABOUT_CHILD)),
    ))
    .unwrap();
    assert_eq!(shell_slot.current_kind(), Some(ABOUT_SHELL));
    assert_eq!(child_slot.current_kind(), Some(ABOUT_CHILD));
    assert_eq!(
        env.take_log(),
        vec![
            // 守卫:后代先行
            "home-child:canUnload",
            "home-shell:canUnload",
            // 加载许可:本级先行,后代随后
            "create:about-shell",
            "about-shell:canLoad",
            "create:about-child",
            "about-child:canLoad",
            // 卸载:后代先行
            "home-child:unload",
            "home-shell:unload",
            // 加载:本级先行
            "about-shell:load",
            "about-child:load",
            // remove-first:整棵旧子树反激活(自底向上)后,新子树激活(自顶向下)
            "home-child:deactivate",
            "home-shell:deactivate",
            "about-shell:activate",
            "about-child:activate",
        ]
    );
}

/// 后代守卫拒绝会取消整棵树的导航。
#[test]
fn descendant_guard_cancels_whole_navigation() {
    let env = TestEnv::new();
    let router = default_router(&env);
    let shell_slot = router.context().register_viewport("default").unwrap();
    shell_slot
        .child_context()
        .register_viewport("default")
        .unwrap();

    block_on(router.load(
        NavigationInstruction::new(HOME_SHELL).with_child(NavigationInstruction::new(HOME_CHILD)),
    ))
    .unwrap();
    env.take_log();
    env.set_plan(
        "home-child",
        HookPlan {
            block_unload: true,
            ..HookPlan::default()
        },
    );

    let navigated = block_on(router.load(NavigationInstruction::new(ABOUT_SHELL))).unwrap();
    assert!(!navigated);
    assert_eq!(shell_slot.current_kind(), Some(HOME_SHELL));
    let log = env.take_log();
    assert!(!log.iter().any(|e| e.starts_with("create:")), "{log:?}");
}

/// 后代 canLoad 失败:整条导航 reject,父子两级均保持原样挂载。
#[test]
fn child_hook_error_keeps_previous_tree_mounted() {
    let env = TestEnv::new();
    let router = default_router(&env);
    let shell_slot = router.context().register_viewport("default").unwrap();
    let child_slot = shell_slot
        .child_context()
        .register_viewport("default")
        .unwrap();

    block_on(router.load(
        NavigationInstruction::new(HOME_SHELL).with_child(NavigationInstruction::new(HOME_CHILD)),
    ))
    .unwrap();
    env.take_log();
    env.set_plan(
        "about-child",
        HookPlan {
            fail_can_load: true,
            ..HookPlan::default()
        },
    );

    let err = block_on(router.load(
        NavigationInstruction::new(ABOUT_SHELL).with_child(NavigationInstruction::new(ABOUT_CHILD)),
    ))
    .unwrap_err();
    assert!(matches!(err, HelmError::Hook { hook: "canLoad", .. }), "{err:?}");
    assert_eq!(shell_slot.current_kind(), Some(HOME_SHELL));
    assert_eq!(child_slot.current_kind(), Some(HOME_CHILD));
    assert_eq!(shell_slot.states(), (CurrState::IsActive, NextState::IsEmpty));
    assert_eq!(child_slot.states(), (CurrState::IsActive, NextState::IsEmpty));
    let log = env.take_log();
    assert!(!log.iter().any(|e| e.ends_with(":unload")), "{log:?}");
    assert!(!router.is_navigating());
}

/// 动态解析模式:残余指令在 canLoad 阶段补解析,新发现的后代汇入同一阶段。
#[test]
fn dynamic_resolution_discovers_children_mid_flight() {
    let env = TestEnv::new();
    let router = Router::builder(
        Arc::new(ProbeFactory {
            env: Arc::clone(&env),
        }),
        Arc::new(LazyResolver),
    )
    .options(RouterOptions {
        resolution: ResolutionMode::Dynamic,
        ..RouterOptions::default()
    })
    .build();
    let shell_slot = router.context().register_viewport("default").unwrap();
    let child_slot = shell_slot
        .child_context()
        .register_viewport("default")
        .unwrap();

    let navigated = block_on(router.load(
        NavigationInstruction::new(HOME_SHELL).with_child(NavigationInstruction::new(HOME_CHILD)),
    ))
    .unwrap();
    assert!(navigated);
    assert_eq!(shell_slot.current_kind(), Some(HOME_SHELL));
    assert_eq!(child_slot.current_kind(), Some(HOME_CHILD));

    let log = env.take_log();
    let shell_can_load = log.iter().position(|e| e == "home-shell:canLoad").unwrap();
    let child_can_load = log.iter().position(|e| e == "home-child:canLoad").unwrap();
    let shell_load = log.iter().position(|e| e == "home-shell:load").unwrap();
    assert!(shell_can_load < child_can_load, "{log:?}");
    assert!(
        child_can_load < shell_load,
        "补解析发生在 canLoad 阶段内,先于 load: {log:?}"
    );
}

/// 在途期间的排队与取代:待决槽只留最新意图,被取代者随后继结局兑现。
#[test]
fn superseded_pending_navigation_settles_with_replacement() {
    let env = TestEnv::new();
    let router = default_router(&env);
    let slot = router.context().register_viewport("default").unwrap();

    block_on(router.load(NavigationInstruction::new(HOME))).unwrap();
    env.take_log();
    // about 的 canLoad 异步让出,保证 contact/blog 在其在途期间入队。
    env.set_plan(
        "about",
        HookPlan {
            async_can_load: true,
            ..HookPlan::default()
        },
    );

    let (a, b, c) = block_on(async {
        futures::join!(
            router.load(NavigationInstruction::new(ABOUT)),
            router.load(NavigationInstruction::new(CONTACT)),
            router.load(NavigationInstruction::new(BLOG)),
        )
    });
    assert_eq!(a.unwrap(), true, "在途导航不被打断,正常提交");
    assert_eq!(b.unwrap(), true, "被取代者随 blog 的结局兑现");
    assert_eq!(c.unwrap(), true);
    assert_eq!(slot.current_kind(), Some(BLOG));

    let log = env.take_log();
    assert!(
        !log.iter().any(|e| e.contains("contact")),
        "被取代的 contact 从未实例化: {log:?}"
    );
}

/// 事件流:开始/结束/取消/错误按导航推进顺序发布。
#[test]
fn events_are_published_in_navigation_order() {
    let env = TestEnv::new();
    let router = default_router(&env);
    router.context().register_viewport("default").unwrap();

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    router.events().subscribe(move |event| {
        sink.lock().push(match event {
            RouterEvent::NavigationStart { id, .. } => format!("start:{id}"),
            RouterEvent::NavigationEnd { id, navigated, .. } => format!("end:{id}:{navigated}"),
            RouterEvent::NavigationCancel { id, .. } => format!("cancel:{id}"),
            RouterEvent::NavigationError { id, .. } => format!("error:{id}"),
        });
    });

    block_on(router.load(NavigationInstruction::new(HOME))).unwrap();
    env.set_plan(
        "home",
        HookPlan {
            block_unload: true,
            ..HookPlan::default()
        },
    );
    block_on(router.load(NavigationInstruction::new(ABOUT))).unwrap();
    env.set_plan("home", HookPlan::default());
    env.set_plan(
        "about",
        HookPlan {
            fail_can_load: true,
            ..HookPlan::default()
        },
    );
    let _ = block_on(router.load(NavigationInstruction::new(ABOUT)));

    assert_eq!(
        *seen.lock(),
        vec!["start:1", "end:1:true", "start:2", "cancel:2", "start:3", "error:3"]
    );
}

/// 历史记录:API 导航提交时 push;浏览器触发的导航被拒时 replace 回滚。
#[test]
fn history_commits_on_success_and_rolls_back_on_cancel() {
    let env = TestEnv::new();
    let history = Arc::new(RecordingHistory::default());
    let router = Router::builder(
        Arc::new(ProbeFactory {
            env: Arc::clone(&env),
        }),
        Arc::new(EchoResolver),
    )
    .parser(NameParser)
    .history(HistoryHandle(Arc::clone(&history)))
    .build();
    router.context().register_viewport("default").unwrap();

    block_on(router.load(NavigationInstruction::new(HOME))).unwrap();
    assert_eq!(*history.ops.lock(), vec!["push:home"]);

    // 浏览器后退到 about,但 home 拒绝卸载:地址栏恢复为已提交的 home。
    env.set_plan(
        "home",
        HookPlan {
            block_unload: true,
            ..HookPlan::default()
        },
    );
    let navigated =
        block_on(router.handle_location_change("about", NavigationTrigger::PopState)).unwrap();
    assert!(!navigated);
    assert_eq!(*history.ops.lock(), vec!["push:home", "replace:home"]);

    // 浏览器触发的成功导航不再写历史(地址栏已是目标)。
    env.set_plan("home", HookPlan::default());
    block_on(router.handle_location_change("about", NavigationTrigger::PopState)).unwrap();
    assert_eq!(*history.ops.lock(), vec!["push:home", "replace:home"]);
}

/// 宿主 attach/detach 直达入口:不经导航补发激活钩子。
#[test]
fn host_attach_detach_replays_activation_hooks() {
    let env = TestEnv::new();
    let router = default_router(&env);
    let slot = router.context().register_viewport("default").unwrap();

    block_on(router.load(NavigationInstruction::new(HOME))).unwrap();
    env.take_log();

    slot.deactivate_from_viewport(router.scheduler());
    slot.activate_from_viewport(router.scheduler());
    block_on(router.scheduler().drain());
    assert_eq!(env.take_log(), vec!["home:deactivate", "home:activate"]);
}

/// 视口注销后旧槽不再被命中;重新登记得到全新代理。
#[test]
fn unregistered_viewport_is_detached_from_navigation() {
    let env = TestEnv::new();
    let router = default_router(&env);
    router.context().register_viewport("default").unwrap();
    block_on(router.load(NavigationInstruction::new(HOME))).unwrap();

    let old = router.context().unregister_viewport("default").unwrap();
    assert_eq!(old.current_kind(), Some(HOME));
    assert!(router.context().slot("default").is_none());

    let fresh = router.context().register_viewport("default").unwrap();
    assert_eq!(fresh.current_kind(), None);
    assert!(matches!(
        router.context().register_viewport("default"),
        Err(HelmError::ViewportAlreadyRegistered { .. })
    ));
}

/// 附加钩子对象:只记日志,逐个钩子验证发起顺序。
struct TaggedHook {
    tag: String,
    env: Arc<TestEnv>,
}

impl Lifecycle for TaggedHook {
    fn can_load(&mut self, _next: &RouteNode) -> HookResult<GuardVerdict> {
        self.env.record(format!("{}:canLoad", self.tag));
        HookResult::allow()
    }

    fn load(&mut self, _next: &RouteNode) -> HookResult<()> {
        self.env.record(format!("{}:load", self.tag));
        HookResult::done()
    }

    fn activate(&mut self) -> HookResult<()> {
        self.env.record(format!("{}:activate", self.tag));
        HookResult::done()
    }
}

/// 为每个组件附带两个发现顺序固定的钩子对象。
struct HookedFactory {
    env: Arc<TestEnv>,
}

impl ComponentFactory for HookedFactory {
    fn create(&self, node: &RouteNode) -> Result<ComponentHandle, HelmError> {
        self.env.record(format!("create:{}", node.component));
        let hooks: Vec<Box<dyn Lifecycle>> = vec![
            Box::new(TaggedHook {
                tag: format!("{}#h1", node.component),
                env: Arc::clone(&self.env),
            }),
            Box::new(TaggedHook {
                tag: format!("{}#h2", node.component),
                env: Arc::clone(&self.env),
            }),
        ];
        Ok(ComponentHandle {
            instance: Box::new(Probe {
                kind: node.component,
                env: Arc::clone(&self.env),
            }),
            hooks,
        })
    }
}

/// 附加钩子按发现顺序先于实例自身**发起**;每个阶段内三者同批。
#[test]
fn attached_hooks_initiate_before_the_instance() {
    let env = TestEnv::new();
    let router = Router::builder(
        Arc::new(HookedFactory {
            env: Arc::clone(&env),
        }),
        Arc::new(EchoResolver),
    )
    .build();
    router.context().register_viewport("default").unwrap();

    block_on(router.load(NavigationInstruction::new(HOME))).unwrap();
    assert_eq!(
        env.take_log(),
        vec![
            "create:home",
            "home#h1:canLoad",
            "home#h2:canLoad",
            "home:canLoad",
            "home#h1:load",
            "home#h2:load",
            "home:load",
            "home#h1:activate",
            "home#h2:activate",
            "home:activate",
        ]
    );
}
