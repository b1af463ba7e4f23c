//! # helm-core:导航生命周期协调内核
//!
//! ## 这个 crate 解决什么问题(Why)
//! - 单页应用的一次导航要把一棵视口树上的新旧组件推过
//!   `canUnload → canLoad → unload → load → swap` 五个生命周期阶段:
//!   守卫自底向上征询、加载自顶向下推进、同一阶段内的异步钩子逻辑并发、
//!   跨阶段严格串行——这套协调逻辑与 UI 框架无关,值得独立成内核;
//! - 本 crate 提供该内核:宿主层(渲染、URL 文法、路由表匹配、历史记录)
//!   通过四个窄接缝接入,内核不反向依赖任何宿主设施。
//!
//! ## 模块地图(What)
//! - [`batch`]:引用计数的扇出/扇入同步原语,整条流水线的推进骨架;
//! - [`hook`]:生命周期能力契约([`Lifecycle`] / [`Component`])与守卫裁决;
//! - [`instruction`] / [`node`]:导航指令树与已解析路由树;
//! - [`component`]:组件代理,把实例与附加钩子适配为统一调用面;
//! - [`viewport`]:视口代理双状态机,内核的核心不变量所在;
//! - [`transition`]:一次在途导航的事实来源(守卫、错误、结果通道);
//! - [`scheduler`]:协作式驱动器,异步钩子的完成续接在此串行执行;
//! - [`router`]:编排器,八阶段流水线与"最新意图胜出"的排队语义;
//! - [`context`]:视口注册表与外部接缝;[`events`]:导航事件流。
//!
//! ## 快速上手(How)
//! ```no_run
//! use std::sync::Arc;
//! use helm_core::{
//!     ComponentFactory, ComponentHandle, HelmError, InstructionTree, NavigationInstruction,
//!     Router, RouteNode, RouteTree, RouteTreeResolver,
//! };
//!
//! # struct AppFactory;
//! # impl ComponentFactory for AppFactory {
//! #     fn create(&self, _: &RouteNode) -> Result<ComponentHandle, HelmError> { unimplemented!() }
//! # }
//! # struct AppResolver;
//! # #[async_trait::async_trait]
//! # impl RouteTreeResolver for AppResolver {
//! #     async fn resolve(&self, _: &InstructionTree) -> Result<RouteTree, HelmError> { unimplemented!() }
//! # }
//! # async fn demo() -> Result<(), HelmError> {
//! let router = Router::builder(Arc::new(AppFactory), Arc::new(AppResolver)).build();
//! router.context().register_viewport("default")?;
//! let navigated = router
//!     .load(NavigationInstruction::new(helm_core::ComponentKind("home")))
//!     .await?;
//! assert!(navigated);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod component;
pub mod context;
pub mod error;
pub mod events;
pub mod hook;
pub mod instruction;
pub mod node;
pub mod router;
pub mod scheduler;
pub mod transition;
pub mod viewport;

pub use batch::Batch;
pub use component::ComponentAgent;
pub use context::{HistoryAdapter, InstructionParser, RouteContext, RouteTreeResolver};
pub use error::HelmError;
pub use events::{RouterEvent, RouterEvents, SubscriptionId};
pub use hook::{
    Component, ComponentFactory, ComponentHandle, GuardVerdict, HookFuture, HookResult, Lifecycle,
};
pub use instruction::{
    ComponentKind, InstructionTree, NavigationInstruction, NavigationTarget, NavigationTrigger,
    Params,
};
pub use node::{ReentryBehavior, RouteNode, RouteTree, merge_by_viewport};
pub use router::{HistoryStrategy, ResolutionMode, Router, RouterBuilder, RouterOptions, SwapOrder};
pub use scheduler::Scheduler;
pub use transition::Transition;
pub use viewport::{CurrState, NextState, TransitionPlan, ViewportSlot};
