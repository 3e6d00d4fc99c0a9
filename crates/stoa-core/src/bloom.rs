//! Bloom's taxonomy levels and the fixed test progression order.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::language::Language;

/// One of the six cognitive-skill levels. The declaration order is the
/// progression order; `Ord` follows it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum BloomLevel {
    #[default]
    Remember,
    Understand,
    Apply,
    Analyze,
    Evaluate,
    Create,
}

impl BloomLevel {
    /// Fixed progression order, lowest cognitive complexity first.
    pub const ORDER: [BloomLevel; 6] = [
        Self::Remember,
        Self::Understand,
        Self::Apply,
        Self::Analyze,
        Self::Evaluate,
        Self::Create,
    ];

    /// Full marks for every level's task.
    pub const MAX_POINTS: f64 = 10.0;

    /// The next level in the progression, or `None` at `Create`.
    pub fn next(self) -> Option<Self> {
        let idx = Self::ORDER.iter().position(|l| *l == self)?;
        Self::ORDER.get(idx + 1).copied()
    }

    /// Localized display label. The Chinese label carries the English name
    /// in parentheses.
    pub fn label(self, language: Language) -> &'static str {
        match language {
            Language::En => match self {
                Self::Remember => "Remember",
                Self::Understand => "Understand",
                Self::Apply => "Apply",
                Self::Analyze => "Analyze",
                Self::Evaluate => "Evaluate",
                Self::Create => "Create",
            },
            Language::Zh => match self {
                Self::Remember => "记忆（Remember）",
                Self::Understand => "理解（Understand）",
                Self::Apply => "应用（Apply）",
                Self::Analyze => "分析（Analyze）",
                Self::Evaluate => "评价（Evaluate）",
                Self::Create => "创造（Create）",
            },
        }
    }

    /// Short localized description of what the level asks of the learner.
    pub fn description(self, language: Language) -> &'static str {
        match language {
            Language::En => match self {
                Self::Remember => "Recall and recognize information",
                Self::Understand => "Understand concepts and meanings",
                Self::Apply => "Apply knowledge to solve problems",
                Self::Analyze => "Analyze information and structure",
                Self::Evaluate => "Evaluate and make judgments",
                Self::Create => "Create new content",
            },
            Language::Zh => match self {
                Self::Remember => "回忆和识别信息",
                Self::Understand => "理解概念和意义",
                Self::Apply => "应用知识解决问题",
                Self::Analyze => "分析信息和结构",
                Self::Evaluate => "评估和判断",
                Self::Create => "创造新内容",
            },
        }
    }

    /// Question verbs that mark a question as belonging to this level, used to
    /// classify examiner output.
    pub fn keywords(self, language: Language) -> &'static [&'static str] {
        match language {
            Language::En => match self {
                Self::Remember => {
                    &["recall", "remember", "list", "define", "name", "identify", "memorize"]
                }
                Self::Understand => {
                    &["understand", "explain", "describe", "summarize", "interpret"]
                }
                Self::Apply => &["apply", "use", "solve", "calculate", "execute", "implement"],
                Self::Analyze => {
                    &["analyze", "compare", "contrast", "distinguish", "examine", "investigate"]
                }
                Self::Evaluate => &["evaluate", "judge", "critique", "choose", "criticize", "defend"],
                Self::Create => &["create", "design", "construct", "invent", "compose", "produce"],
            },
            Language::Zh => match self {
                Self::Remember => &["回忆", "记住", "列出", "定义", "说出", "识别", "记忆"],
                Self::Understand => &["理解", "解释", "说明", "描述", "总结", "概括"],
                Self::Apply => &["应用", "使用", "解决", "计算", "执行", "实施"],
                Self::Analyze => &["分析", "比较", "对比", "区分", "分解", "检查"],
                Self::Evaluate => &["评估", "评价", "判断", "选择", "批评", "辩护"],
                Self::Create => &["创造", "设计", "制作", "构建", "发明", "编写"],
            },
        }
    }
}

impl fmt::Display for BloomLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remember => write!(f, "remember"),
            Self::Understand => write!(f, "understand"),
            Self::Apply => write!(f, "apply"),
            Self::Analyze => write!(f, "analyze"),
            Self::Evaluate => write!(f, "evaluate"),
            Self::Create => write!(f, "create"),
        }
    }
}

impl std::str::FromStr for BloomLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "remember" => Ok(Self::Remember),
            "understand" => Ok(Self::Understand),
            "apply" => Ok(Self::Apply),
            "analyze" => Ok(Self::Analyze),
            "evaluate" => Ok(Self::Evaluate),
            "create" => Ok(Self::Create),
            _ => Err(format!("invalid bloom level: {s}")),
        }
    }
}
