//! # node 模块：已解析的路由节点树与差分工具
//!
//! ## 角色定位（Why）
//! - 路由树解析器（外部协作者）把指令树解析为 `RouteNode` 树：每个节点绑定一个
//!   组件类型、其参数与子节点；内核只读取该树，并在流水线推进过程中将节点与
//!   目标视口槽配对。
//! - 动态解析模式下，树允许携带 `residue`（尚未解析的残余指令）：`canLoad` 阶段
//!   会按需补解析，运行期发现新的子节点——这正是 Batch 动态 push/pop 服务的场景。
//!
//! ## 契约定位（What）
//! - `RouteNode` 为纯值类型；一次 Transition 内对树的补全只发生在该 Transition
//!   持有的 `next` 副本上，已提交的 `current` 树不被修改；
//! - `merge_by_viewport` 给出前/后两组同层节点按视口身份的保序配对，是 Router
//!   计算顶层差分的唯一入口。

use crate::instruction::{ComponentKind, NavigationInstruction, Params};

/// 路由复用（reentry）策略：同型组件再次命中同一视口时的处置方式。
///
/// # 教案式说明
/// - **意图 (Why)**：参数变化但组件不变的导航不应整体重建组件，由该策略裁决
///   生命周期钩子是否重放；
/// - **契约 (What)**：`Default` 表示"参数不同则重放钩子，完全相同则不动"；
///   其余三个值固定覆盖该判定；
/// - **风险 (Trade-offs)**：未提供以闭包形式自定义判定的入口；如有需要，可在
///   解析器侧预先归一化为这四个值之一。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ReentryBehavior {
    /// 参数不同 ⇒ 重放生命周期；完全相同 ⇒ 不做任何事。
    #[default]
    Default,
    /// 永不重放，也不重建。
    None,
    /// 总是重放生命周期钩子，但保留组件实例。
    InvokeLifecycles,
    /// 总是整体重建组件。
    Replace,
}

/// 一个已解析的路由段：组件 + 视口 + 参数 + 子节点（+ 未解析残余）。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RouteNode {
    /// 绑定的组件类型。
    pub component: ComponentKind,
    /// 目标视口名。
    pub viewport: String,
    /// 本段参数。
    pub params: Params,
    /// 复用策略。
    pub reentry: ReentryBehavior,
    /// 已解析的子节点：必须落位于本组件下嵌套的视口。
    pub children: Vec<RouteNode>,
    /// 动态解析模式下尚未解析的残余指令；`canLoad` 阶段按需补全。
    pub residue: Vec<NavigationInstruction>,
}

impl RouteNode {
    /// 以默认视口构造节点。
    pub fn new(component: ComponentKind) -> Self {
        Self {
            component,
            viewport: "default".to_owned(),
            params: Params::new(),
            reentry: ReentryBehavior::Default,
            children: Vec::new(),
            residue: Vec::new(),
        }
    }

    /// 指定落位视口。
    pub fn in_viewport(mut self, viewport: impl Into<String>) -> Self {
        self.viewport = viewport.into();
        self
    }

    /// 追加单个参数。
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// 指定复用策略。
    pub fn with_reentry(mut self, reentry: ReentryBehavior) -> Self {
        self.reentry = reentry;
        self
    }

    /// 追加已解析子节点。
    pub fn with_child(mut self, child: RouteNode) -> Self {
        self.children.push(child);
        self
    }

    /// 追加未解析残余指令。
    pub fn with_residue(mut self, residue: NavigationInstruction) -> Self {
        self.residue.push(residue);
        self
    }
}

/// 一次导航的完整目标树：顶层节点按视口并列。
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RouteTree {
    /// 根上下文下的顶层节点。
    pub root: Vec<RouteNode>,
}

impl RouteTree {
    /// 单节点便捷构造。
    pub fn single(node: RouteNode) -> Self {
        Self { root: vec![node] }
    }
}

/// 按视口身份对前/后两组同层节点做保序配对。
///
/// # 教案式注释
/// - **意图 (Why)**：Router 需要一份"受影响视口"清单来驱动五阶段流水线；
///   同一视口的前后节点必须配成一对，才能让该视口的代理同时看到 curr 与 next；
/// - **契约 (What)**：
///   - 先按 `prev` 的相对顺序输出所有前侧视口（配上 next 中的同名节点，如有）；
///   - 再按 `next` 的相对顺序输出仅出现在后侧的视口（纯新增）；
///   - 返回 `(视口名, Option<前节点>, Option<后节点>)` 三元组；
/// - **执行 (How)**：双层线性扫描；同层视口数通常为个位数，不值得引入哈希索引。
pub fn merge_by_viewport<'a>(
    prev: &'a [RouteNode],
    next: &'a [RouteNode],
) -> Vec<(&'a str, Option<&'a RouteNode>, Option<&'a RouteNode>)> {
    let mut merged: Vec<(&str, Option<&RouteNode>, Option<&RouteNode>)> = Vec::new();
    for p in prev {
        let n = next.iter().find(|n| n.viewport == p.viewport);
        merged.push((p.viewport.as_str(), Some(p), n));
    }
    for n in next {
        if !prev.iter().any(|p| p.viewport == n.viewport) {
            merged.push((n.viewport.as_str(), None, Some(n)));
        }
    }
    merged
}
