//! # instruction 模块：导航指令树
//!
//! ## 角色定位（Why）
//! - 导航请求以"指令树"的形式进入内核：每条指令声明目标组件、落位视口、参数与
//!   子指令。URL/路径文法到指令树的转换属于外部解析器的职责（见
//!   [`crate::context::InstructionParser`]），内核只消费结构化指令。
//!
//! ## 契约定位（What）
//! - 指令树是纯值类型：可克隆、可比较，进入 `Transition` 后不再修改；
//! - `to_path` 提供与历史记录层交互所需的最小序列化（兄弟以 `+`、父子以 `/` 连接），
//!   不承诺与任何具体 URL 文法互逆。

use std::collections::BTreeMap;
use std::fmt;

/// 路由参数表。按键有序，保证比较与序列化的确定性。
pub type Params = BTreeMap<String, String>;

/// 组件类型标识。
///
/// # 教案式说明
/// - **意图 (Why)**：跃迁计划（replace / invoke-lifecycles / none）的选取依赖
///   "当前组件与目标组件是否同型"，需要一个廉价、可哈希的身份标识；
/// - **契约 (What)**：以 `&'static str` 为载体，满足 `Copy + Eq + Hash`；
/// - **风险 (Trade-offs)**：若未来组件类型在运行期动态注册，需要换成驻留字符串
///   或数值 id，本类型的使用面已收敛为单字段便于替换。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ComponentKind(pub &'static str);

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// 导航触发来源。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NavigationTrigger {
    /// 应用代码显式调用 `Router::load`。
    Api,
    /// 浏览器历史前进/后退（popstate）。
    PopState,
    /// hash 片段变化。
    HashChange,
}

/// 一条导航指令：目标组件 + 落位视口 + 参数 + 子指令。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NavigationInstruction {
    /// 目标组件类型。
    pub component: ComponentKind,
    /// 目标视口名；空缺时由构造函数填入 `"default"`。
    pub viewport: String,
    /// 路由参数。
    pub params: Params,
    /// 嵌套在目标组件下的子指令。
    pub children: Vec<NavigationInstruction>,
}

impl NavigationInstruction {
    /// 以默认视口构造叶子指令。
    pub fn new(component: ComponentKind) -> Self {
        Self {
            component,
            viewport: "default".to_owned(),
            params: Params::new(),
            children: Vec::new(),
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

    /// 追加子指令。
    pub fn with_child(mut self, child: NavigationInstruction) -> Self {
        self.children.push(child);
        self
    }

    fn write_path(&self, out: &mut String) {
        out.push_str(self.component.0);
        if self.viewport != "default" {
            out.push('@');
            out.push_str(&self.viewport);
        }
        if !self.params.is_empty() {
            out.push('(');
            for (i, (k, v)) in self.params.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(k);
                out.push('=');
                out.push_str(v);
            }
            out.push(')');
        }
        if !self.children.is_empty() {
            out.push('/');
            for (i, child) in self.children.iter().enumerate() {
                if i > 0 {
                    out.push('+');
                }
                child.write_path(out);
            }
        }
    }
}

/// 一次导航请求的顶层指令集合。
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstructionTree {
    /// 顶层（根上下文）指令，按视口并列。
    pub instructions: Vec<NavigationInstruction>,
}

impl InstructionTree {
    /// 单指令便捷构造。
    pub fn single(instruction: NavigationInstruction) -> Self {
        Self {
            instructions: vec![instruction],
        }
    }

    /// 序列化为历史记录层使用的路径文本。
    pub fn to_path(&self) -> String {
        let mut out = String::new();
        for (i, ins) in self.instructions.iter().enumerate() {
            if i > 0 {
                out.push('+');
            }
            ins.write_path(&mut out);
        }
        out
    }
}

impl fmt::Display for InstructionTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_path())
    }
}

impl From<NavigationInstruction> for InstructionTree {
    fn from(instruction: NavigationInstruction) -> Self {
        Self::single(instruction)
    }
}

/// `Router::load` 的入参：结构化指令树或待解析的裸路径。
#[derive(Clone, Debug)]
pub enum NavigationTarget {
    /// 已结构化的指令树，直接进入解析/流水线。
    Instructions(InstructionTree),
    /// 裸路径文本，需经配置的 [`InstructionParser`](crate::context::InstructionParser)
    /// 转换；未配置解析器时返回
    /// [`HelmError::ParserMissing`](crate::error::HelmError::ParserMissing)。
    Path(String),
}

impl From<InstructionTree> for NavigationTarget {
    fn from(tree: InstructionTree) -> Self {
        Self::Instructions(tree)
    }
}

impl From<NavigationInstruction> for NavigationTarget {
    fn from(instruction: NavigationInstruction) -> Self {
        Self::Instructions(InstructionTree::single(instruction))
    }
}

impl From<&str> for NavigationTarget {
    fn from(path: &str) -> Self {
        Self::Path(path.to_owned())
    }
}
