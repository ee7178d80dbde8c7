//! 特殊词与原子词。
//!
//! 特殊词、动态添加的词以及别名的外部拼写都是原子的：它们在预分词阶段作为整体被识别，
//! 不参与合词，也不会被拆开。识别使用前缀树，在每个位置取最长匹配。

use crate::{utok, Aliases, Marker, Vocab};
use patricia_tree::PatriciaMap;
use std::collections::{HashMap, HashSet};

/// 原子词匹配到的内容。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Atom {
    /// 特殊词
    Special(utok),
    /// 动态添加的词
    Added(utok),
    /// 别名的外部拼写，携带规范拼写的序号
    Alias(utok),
}

impl Atom {
    #[inline]
    pub const fn token(self) -> utok {
        match self {
            Self::Special(t) | Self::Added(t) | Self::Alias(t) => t,
        }
    }
}

/// 预分词得到的片段。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Segment<'a> {
    /// 普通文本，交给 bpe 处理
    Text(&'a str),
    /// 整体匹配的原子词
    Atom(&'a str, Atom),
}

pub struct SpecialTokens {
    special: HashMap<String, utok>,
    added: HashSet<String>,
    trie: PatriciaMap<Atom>,
}

impl SpecialTokens {
    /// 构造特殊词表和原子词前缀树。
    ///
    /// 同一字符串有多种身份时，优先级为 特殊词 > 添加词 > 别名。
    /// 匹配在空格已替换为词边界标记的文本上进行，因此键中的空格也替换为标记。
    pub fn new(
        special: &[(String, utok)],
        added: &[String],
        aliases: &Aliases,
        vocab: &Vocab,
        marker: &Marker,
    ) -> Self {
        let mut trie = PatriciaMap::new();
        for (external, canonical) in aliases.iter() {
            match vocab.id_of(canonical) {
                Some(t) => {
                    trie.insert(marker.mark_spaces(external).as_bytes(), Atom::Alias(t));
                }
                None => log::warn!("alias target {canonical:?} is not in vocab"),
            }
        }
        for piece in added {
            if let Some(t) = vocab.id_of(piece) {
                trie.insert(marker.mark_spaces(piece).as_bytes(), Atom::Added(t));
            }
        }
        for (piece, t) in special {
            if !piece.is_empty() {
                trie.insert(marker.mark_spaces(piece).as_bytes(), Atom::Special(*t));
            }
        }
        Self {
            special: special.iter().cloned().collect(),
            added: added.iter().cloned().collect(),
            trie,
        }
    }

    #[inline]
    pub fn is_special(&self, piece: &str) -> bool {
        self.special.contains_key(piece)
    }

    #[inline]
    pub fn is_added(&self, piece: &str) -> bool {
        self.added.contains(piece)
    }

    /// 特殊词或添加词，解码时原样输出。
    #[inline]
    pub fn is_verbatim(&self, piece: &str) -> bool {
        self.is_special(piece) || self.is_added(piece)
    }

    #[inline]
    pub fn special_id(&self, piece: &str) -> Option<utok> {
        self.special.get(piece).copied()
    }

    #[inline]
    pub fn special_len(&self) -> usize {
        self.special.len()
    }

    #[inline]
    pub fn added_len(&self) -> usize {
        self.added.len()
    }

    /// 在 `text[pos..]` 开头查找最长的原子词。
    #[inline]
    fn match_at(&self, text: &str, pos: usize) -> Option<(usize, Atom)> {
        self.trie
            .get_longest_common_prefix(&text.as_bytes()[pos..])
            .map(|(pre, atom)| (pre.len(), *atom))
    }

    /// 将文本切分为普通文本片段和原子词片段，保持原有顺序。
    pub fn split<'a>(&'a self, text: &'a str) -> Split<'a> {
        Split {
            special: self,
            text,
            pos: 0,
            pending: None,
        }
    }
}

pub struct Split<'a> {
    special: &'a SpecialTokens,
    text: &'a str,
    pos: usize,
    pending: Option<(usize, Atom)>,
}

impl<'a> Iterator for Split<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.pos;
        if let Some((len, atom)) = self.pending.take() {
            self.pos += len;
            return Some(Segment::Atom(&self.text[start..self.pos], atom));
        }
        if start == self.text.len() {
            return None;
        }
        if !self.special.trie.is_empty() {
            for (off, _) in self.text[start..].char_indices() {
                if let Some((len, atom)) = self.special.match_at(self.text, start + off) {
                    if off == 0 {
                        self.pos += len;
                        return Some(Segment::Atom(&self.text[start..self.pos], atom));
                    }
                    self.pending = Some((len, atom));
                    self.pos += off;
                    return Some(Segment::Text(&self.text[start..self.pos]));
                }
            }
        }
        self.pos = self.text.len();
        Some(Segment::Text(&self.text[start..]))
    }
}
