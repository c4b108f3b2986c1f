//! 动作分类：按名称判定 Safe / Sensitive
//!
//! 敏感名单启动时从配置读入，运行期不变；不在名单中的名称一律视为 Safe。

use std::collections::HashSet;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Safe,
    Sensitive,
}

/// 纯函数版本：给定敏感名单分类
pub fn classify(action_name: &str, sensitive: &HashSet<String>) -> Classification {
    if sensitive.contains(action_name) {
        Classification::Sensitive
    } else {
        Classification::Safe
    }
}

/// 持有敏感名单的分类器
#[derive(Debug, Clone, Default)]
pub struct ActionClassifier {
    sensitive: HashSet<String>,
}

impl ActionClassifier {
    pub fn new<I, S>(sensitive: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sensitive: sensitive.into_iter().map(Into::into).collect(),
        }
    }

    pub fn classify(&self, action_name: &str) -> Classification {
        classify(action_name, &self.sensitive)
    }

    pub fn is_sensitive(&self, action_name: &str) -> bool {
        self.classify(action_name) == Classification::Sensitive
    }
}
