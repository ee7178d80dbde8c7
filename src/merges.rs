//! 合词规则表。
//!
//! 规则在列表中的位置即为排名，排名越小越先合并。

use crate::{Error, Result, Stage};
use serde::Deserialize;
use std::collections::{hash_map::Entry, HashMap};

/// `tokenizer.json` 中一条合词规则的原始形态。
///
/// 两种合法形态：`["a", "b"]` 或 `"a b"`。其他任何形态都在转换时拒绝。
#[derive(Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum RawMerge {
    Pair(Vec<String>),
    Joined(String),
    Other(serde_json::Value),
}

/// 规范化后的合词规则。
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MergeRule {
    pub left: String,
    pub right: String,
}

impl MergeRule {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }

    /// 将原始形态规范化，`index` 只用于报错。
    pub fn parse(raw: RawMerge, index: usize) -> Result<Self> {
        let malformed = |what: &dyn std::fmt::Debug| {
            Error::malformed(
                Stage::VocabularyLoaded,
                format!("merge rule #{index} is not a pair: {what:?}"),
            )
        };
        let (left, right) = match raw {
            RawMerge::Pair(pair) => match <[String; 2]>::try_from(pair) {
                Ok([left, right]) => (left, right),
                Err(pair) => return Err(malformed(&pair)),
            },
            RawMerge::Joined(joined) => match joined.split_once(' ') {
                Some((left, right)) if !right.contains(' ') => {
                    (left.to_string(), right.to_string())
                }
                _ => return Err(malformed(&joined)),
            },
            RawMerge::Other(value) => return Err(malformed(&value)),
        };
        if left.is_empty() || right.is_empty() {
            return Err(malformed(&(left, right)));
        }
        Ok(Self { left, right })
    }
}

/// 合词排名表，提供 O(1) 的排名查询。
///
/// 规则中出现的符号先被驻留为整数，查询时不需要分配字符串。
#[derive(Default, Debug)]
pub struct MergeRanks {
    symbols: HashMap<Box<str>, u32>,
    ranks: HashMap<(u32, u32), u32>,
}

impl MergeRanks {
    /// 按顺序构造排名表。同一个对重复出现时保留第一次出现的排名。
    pub fn new(rules: impl IntoIterator<Item = MergeRule>) -> Self {
        let mut ans = Self::default();
        let mut duplicated = 0usize;
        for (rank, MergeRule { left, right }) in rules.into_iter().enumerate() {
            let pair = (ans.intern(left), ans.intern(right));
            match ans.ranks.entry(pair) {
                Entry::Occupied(_) => duplicated += 1,
                Entry::Vacant(entry) => {
                    entry.insert(rank as _);
                }
            }
        }
        if duplicated > 0 {
            log::debug!("{duplicated} duplicated merge rules ignored, first occurrence kept");
        }
        ans
    }

    /// 解析原始规则列表并构造排名表，遇到非法规则立即失败。
    pub fn parse(raw: impl IntoIterator<Item = RawMerge>) -> Result<Self> {
        let rules = raw
            .into_iter()
            .enumerate()
            .map(|(i, raw)| MergeRule::parse(raw, i))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(rules))
    }

    /// 查询一对相邻符号的合并排名，未登记的对返回 `None`。
    #[inline]
    pub fn rank_of(&self, left: &str, right: &str) -> Option<u32> {
        let left = *self.symbols.get(left)?;
        let right = *self.symbols.get(right)?;
        self.ranks.get(&(left, right)).copied()
    }

    /// 不同合词对的数量。
    #[inline]
    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    fn intern(&mut self, symbol: String) -> u32 {
        let next = self.symbols.len() as u32;
        *self.symbols.entry(symbol.into_boxed_str()).or_insert(next)
    }
}
