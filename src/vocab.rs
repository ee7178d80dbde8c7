//! 词表及其分阶段构造。
//!
//! 词表由多个来源叠加而成：训练得到的基础词表、标记为特殊的词、未标记为特殊的附加词、
//! 宿主程序动态添加的词以及别名的规范拼写。所有来源先各自收集为不可变列表，
//! 再按固定优先级折叠成最终的映射，折叠过程中不对外暴露任何中间状态。

use crate::{utok, Error, Result, Stage};
use std::collections::{hash_map::Entry, HashMap, HashSet};

/// 词与序号的双向映射。构造完成后不可变。
#[derive(Debug)]
pub struct Vocab {
    ids: HashMap<String, utok>,
    pieces: HashMap<utok, String>,
}

impl Vocab {
    /// piece -> token
    #[inline]
    pub fn id_of(&self, piece: &str) -> Option<utok> {
        self.ids.get(piece).copied()
    }

    /// token -> piece
    #[inline]
    pub fn token_of(&self, token: utok) -> Option<&str> {
        self.pieces.get(&token).map(String::as_str)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// 遍历所有 `(piece, token)`，顺序不确定。
    pub fn iter(&self) -> impl Iterator<Item = (&str, utok)> + '_ {
        self.ids.iter().map(|(k, &v)| (k.as_str(), v))
    }
}

/// 词表构造器，按来源分别收集，最后一次性折叠。
#[derive(Default, Debug)]
pub struct VocabBuilder {
    base: Vec<(String, utok)>,
    special: Vec<(String, utok)>,
    plain: Vec<(String, utok)>,
    added: Vec<String>,
}

/// 折叠的结果：词表本身和同时确定下来的特殊词表、附加词名单。
#[derive(Debug)]
pub struct Layered {
    pub vocab: Vocab,
    /// 最终的特殊词，按登记顺序
    pub special: Vec<(String, utok)>,
    /// 动态添加的词，按登记顺序去重
    pub added: Vec<String>,
}

impl VocabBuilder {
    /// 训练得到的基础词表。
    pub fn base(&mut self, entries: impl IntoIterator<Item = (String, utok)>) -> &mut Self {
        self.base.extend(entries);
        self
    }

    /// 标记为特殊的词，覆盖基础词表中的同名词。
    pub fn special(&mut self, entries: impl IntoIterator<Item = (String, utok)>) -> &mut Self {
        self.special.extend(entries);
        self
    }

    /// 带有固定序号但未标记为特殊的附加词，不会覆盖特殊词。
    pub fn plain(&mut self, entries: impl IntoIterator<Item = (String, utok)>) -> &mut Self {
        self.plain.extend(entries);
        self
    }

    /// 动态添加的词。已存在的词保持原序号，否则分配下一个未使用的序号。
    pub fn added<T: Into<String>>(&mut self, pieces: impl IntoIterator<Item = T>) -> &mut Self {
        self.added.extend(pieces.into_iter().map(Into::into));
        self
    }

    /// 按优先级折叠所有来源：基础词表 -> 特殊词 -> 附加词 -> 动态添加的词。
    pub fn build(self) -> Result<Layered> {
        let Self {
            base,
            special,
            plain,
            added,
        } = self;

        let mut ids = HashMap::with_capacity(base.len() + special.len() + added.len());
        ids.extend(base);
        log::debug!("base vocabulary: {} entries", ids.len());

        let mut special_set = HashSet::new();
        let mut special_order = Vec::new();
        for (piece, token) in special {
            overwrite(&mut ids, &piece, token, "special");
            if special_set.insert(piece.clone()) {
                special_order.push(piece);
            }
        }

        for (piece, token) in plain {
            if special_set.contains(&piece) {
                log::warn!("added token {piece:?} ({token}) is already special, skipped");
                continue;
            }
            overwrite(&mut ids, &piece, token, "added");
        }

        // 序号空间耗尽时为 None
        let mut next = ids.values().max().map_or(Some(0), |&max| max.checked_add(1));
        let mut added_set = HashSet::new();
        let mut added_order = Vec::new();
        for piece in added {
            if piece.is_empty() || !added_set.insert(piece.clone()) {
                continue;
            }
            if let Entry::Vacant(entry) = ids.entry(piece.clone()) {
                let token = next.ok_or_else(|| {
                    Error::malformed(Stage::AddedTokensLoaded, "token id space exhausted")
                })?;
                entry.insert(token);
                next = token.checked_add(1);
            }
            added_order.push(piece);
        }

        // 最终映射必须是单射，否则无法从序号反查
        let mut pieces = HashMap::with_capacity(ids.len());
        for (piece, &token) in &ids {
            if let Some(other) = pieces.insert(token, piece.clone()) {
                let (a, b) = if other < *piece {
                    (other, piece.clone())
                } else {
                    (piece.clone(), other)
                };
                return Err(Error::malformed(
                    Stage::SpecialTokensMerged,
                    format!("token id {token} is shared by {a:?} and {b:?}"),
                ));
            }
        }

        let special = special_order
            .into_iter()
            .map(|piece| {
                let token = ids[&piece];
                (piece, token)
            })
            .collect();
        Ok(Layered {
            vocab: Vocab { ids, pieces },
            special,
            added: added_order,
        })
    }
}

fn overwrite(ids: &mut HashMap<String, utok>, piece: &str, token: utok, source: &str) {
    match ids.get_mut(piece) {
        Some(old) if *old != token => {
            log::warn!("{source} token {piece:?} moves from id {old} to {token}");
            *old = token;
        }
        Some(_) => {}
        None => {
            ids.insert(piece.to_string(), token);
        }
    }
}
