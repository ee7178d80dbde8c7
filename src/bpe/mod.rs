mod algorithm;

use crate::{utok, Error, MergeRanks, Result, Vocab};
use std::{borrow::Cow, collections::HashMap};

pub use algorithm::MergeState;

/// SentencePiece 风格的词边界标记 `▁`。
pub const SPIECE_UNDERLINE: &str = "\u{2581}";

/// 词边界标记的放置方式。
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub enum Placement {
    /// 每个空格替换为标记
    #[default]
    Replace,
    /// 在替换的基础上，在文本开头额外加一个标记，解码时去掉开头的一个空格
    Prefix,
}

/// 词边界标记。词表训练时用什么约定，编解码就必须用同样的约定。
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Marker {
    text: String,
    placement: Placement,
}

impl Default for Marker {
    fn default() -> Self {
        Self::new(SPIECE_UNDERLINE, Placement::Replace)
    }
}

impl Marker {
    /// 空字符串表示不使用标记。
    pub fn new(text: impl Into<String>, placement: Placement) -> Self {
        Self {
            text: text.into(),
            placement,
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// 将文本中的每个空格替换为标记。
    pub fn mark_spaces<'t>(&self, text: &'t str) -> Cow<'t, str> {
        if self.text.is_empty() || memchr::memchr(b' ', text.as_bytes()).is_none() {
            return Cow::Borrowed(text);
        }
        let mut ans = String::with_capacity(text.len() * 2);
        let mut start = 0;
        for pos in memchr::memchr_iter(b' ', text.as_bytes()) {
            ans.push_str(&text[start..pos]);
            ans.push_str(&self.text);
            start = pos + 1;
        }
        ans.push_str(&text[start..]);
        Cow::Owned(ans)
    }

    /// `Prefix` 约定下，在位于输入开头的文本前加一个标记。
    ///
    /// 只有特殊词位于其前的文本也视为位于开头。
    pub fn prefix<'t>(&self, text: &'t str, at_start: bool) -> Cow<'t, str> {
        if at_start && self.placement == Placement::Prefix && !self.text.is_empty() {
            Cow::Owned(format!("{}{text}", self.text))
        } else {
            Cow::Borrowed(text)
        }
    }

    /// 去掉编码时加在开头的标记。
    pub fn strip_prefix<'p>(&self, piece: &'p str, at_start: bool) -> &'p str {
        if at_start && self.placement == Placement::Prefix && !self.text.is_empty() {
            piece.strip_prefix(self.text.as_str()).unwrap_or(piece)
        } else {
            piece
        }
    }

    /// 将词中的标记还原为空格并追加到 `out`。
    pub fn unmark(&self, piece: &str, out: &mut String) {
        if self.text.is_empty() {
            out.push_str(piece);
            return;
        }
        let mut start = 0;
        for pos in memchr::memmem::find_iter(piece.as_bytes(), self.text.as_bytes()) {
            out.push_str(&piece[start..pos]);
            out.push(' ');
            start = pos + self.text.len();
        }
        out.push_str(&piece[start..]);
    }
}

/// 基于合词排名的 bpe 分词器，处理不含原子词的普通文本。
pub struct Bpe {
    vocab: Vocab,
    ranks: MergeRanks,
    marker: Marker,
    /// token: <unk>
    unk: Option<utok>,
}

impl Bpe {
    pub fn new(vocab: Vocab, ranks: MergeRanks, marker: Marker, unk: Option<utok>) -> Self {
        Self {
            vocab,
            ranks,
            marker,
            unk,
        }
    }

    #[inline]
    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    #[inline]
    pub fn ranks(&self) -> &MergeRanks {
        &self.ranks
    }

    #[inline]
    pub fn marker(&self) -> &Marker {
        &self.marker
    }

    #[inline]
    pub fn unk_token(&self) -> Option<utok> {
        self.unk
    }

    /// 对已施加标记约定的文本执行合词，返回最终的片段。
    ///
    /// 合成出词表中不存在的片段时，沿合并历史拆回词表中存在的片段。
    pub fn tokenize<'t>(&self, text: &'t str) -> Vec<&'t str> {
        let mut state = self.begin_merge(text);
        while state.merge() {}
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("\n{state}");
        }

        let mut ans = Vec::new();
        for (pos, len) in state.iter() {
            self.resegment(&state, pos, len, &mut ans);
        }
        ans
    }

    fn resegment<'t>(
        &self,
        state: &MergeState<'_, 't>,
        pos: usize,
        len: usize,
        out: &mut Vec<&'t str>,
    ) {
        let piece = state.piece(pos, len);
        if self.vocab.id_of(piece).is_some() {
            out.push(piece);
            return;
        }
        match state.split_of(pos, len) {
            Some(left) => {
                self.resegment(state, pos, left, out);
                self.resegment(state, pos + left, len - left, out);
            }
            None => out.push(piece),
        }
    }

    /// 对已施加标记约定的文本编码，追加到 `out`。
    pub fn encode(&self, text: &str, out: &mut Vec<utok>) -> Result<()> {
        for piece in self.tokenize(text) {
            out.push(self.piece_to_token(piece)?);
        }
        Ok(())
    }

    /// 查询片段的序号，不存在时退回 <unk>。
    pub fn piece_to_token(&self, piece: &str) -> Result<utok> {
        self.vocab
            .id_of(piece)
            .or(self.unk)
            .ok_or_else(|| Error::UnknownToken(piece.to_string()))
    }

    /// token id -> piece
    #[inline]
    pub fn token(&self, token: utok) -> Result<&str> {
        self.vocab.token_of(token).ok_or(Error::UnknownId(token))
    }

    /// bpe 词表中，并非所有词都是合词规则可达的。此算法可识别“内部不可达”的词。
    pub fn inaccessible(&self) -> HashMap<&str, utok> {
        self.vocab
            .iter()
            .filter(|(piece, _)| self.tokenize(piece).len() > 1)
            .collect()
    }
}
