use crate::{
    loader::{load_dir, ModelDir},
    special::{Atom, Segment},
    template::{looks_like_template, Bindings, ChatMessage, TemplateRenderer},
    utok, Aliases, Bpe, Error, Marker, MergeRanks, ModelArtifact, Result, Roles,
    SpecialTokens, Stage, TokenizerConfig, Vocab, VocabBuilder,
};
use std::{collections::HashMap, fmt, path::Path};

/// 完整的分词器：原子词识别、别名、bpe 合词与解码。
///
/// 只能通过 [`TokenizerBuilder::build`] 构造，构造完成后不可变，可以在线程间共享。
pub struct Tokenizer {
    bpe: Bpe,
    special: SpecialTokens,
    aliases: Aliases,
    roles: Roles,
    config: TokenizerConfig,
}

/// 诊断用的规模信息。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Stats {
    pub vocab_size: usize,
    pub merges: usize,
    pub added: usize,
    pub special: usize,
}

impl Tokenizer {
    /// 从模型目录构造分词器，使用默认的词边界标记。
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        TokenizerBuilder::from_dir(dir)?.build()
    }

    /// 编码文本。
    ///
    /// 空格先替换为词边界标记，然后识别原子词，其余文本交给 bpe。
    /// `do_tokenize` 为 `false` 时，整个输入视为一个已经切分好的词直接查表。
    ///
    /// 合词的代价随单个普通文本片段的长度增长，为 O(n log n)。
    pub fn encode(&self, text: &str, do_tokenize: bool) -> Result<Vec<utok>> {
        let marker = self.bpe.marker();
        let marked = marker.mark_spaces(text);
        if !do_tokenize {
            if marked.is_empty() {
                return Ok(Vec::new());
            }
            let piece = self.aliases.canonical(&marked).unwrap_or(marked.as_ref());
            return Ok(vec![self.bpe.piece_to_token(piece)?]);
        }

        let mut ans = Vec::new();
        let mut at_start = true;
        for segment in self.special.split(&marked) {
            match segment {
                Segment::Atom(_, atom) => {
                    at_start &= matches!(atom, Atom::Special(_));
                    ans.push(atom.token());
                }
                Segment::Text(text) => {
                    self.bpe.encode(&marker.prefix(text, at_start), &mut ans)?;
                    at_start = false;
                }
            }
        }
        Ok(ans)
    }

    /// 在开头加上 bos 后编码。没有配置 bos 时与 `encode(text, true)` 相同。
    pub fn encode_with_special_tokens(&self, text: &str) -> Result<Vec<utok>> {
        let mut ans = Vec::from_iter(self.roles.bos);
        ans.extend(self.encode(text, true)?);
        Ok(ans)
    }

    /// 与 `encode(text, true)` 走相同的流程，但返回片段而不是序号。
    ///
    /// 别名的外部拼写以规范拼写给出，片段中的空格已替换为词边界标记。
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let marker = self.bpe.marker();
        let marked = marker.mark_spaces(text);
        let mut ans = Vec::new();
        let mut at_start = true;
        for segment in self.special.split(&marked) {
            match segment {
                Segment::Atom(piece, atom) => {
                    at_start &= matches!(atom, Atom::Special(_));
                    let piece = self.bpe.vocab().token_of(atom.token()).unwrap_or(piece);
                    ans.push(piece.to_string());
                }
                Segment::Text(text) => {
                    let text = marker.prefix(text, at_start);
                    ans.extend(self.bpe.tokenize(&text).into_iter().map(String::from));
                    at_start = false;
                }
            }
        }
        ans
    }

    /// 解码。
    ///
    /// 别名的规范拼写先恢复为外部拼写，之后所有词中的词边界标记都还原为空格。
    /// 特殊词原样输出，不会被跳过。
    pub fn decode(&self, tokens: &[utok]) -> Result<String> {
        let marker = self.bpe.marker();
        let mut ans = String::with_capacity(tokens.len() * 4);
        let mut at_start = true;
        for &t in tokens {
            let piece = self.bpe.token(t)?;
            if self.special.is_special(piece) {
                ans.push_str(piece);
                continue;
            }
            let piece = match self.aliases.external(piece) {
                Some(external) => external,
                None if self.special.is_added(piece) => piece,
                None => marker.strip_prefix(piece, at_start),
            };
            at_start = false;
            marker.unmark(piece, &mut ans);
        }
        Ok(ans)
    }

    /// 检查对话模板并交给渲染器渲染。
    pub fn apply_chat_template<R: TemplateRenderer>(
        &self,
        renderer: &R,
        messages: &[ChatMessage],
    ) -> Result<String> {
        let template = match self.config.chat_template.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => return Err(Error::TemplateUnavailable("no chat template configured".into())),
        };
        if !looks_like_template(template) {
            return Err(Error::TemplateUnavailable(
                "chat template doesn't appear to be a valid template".into(),
            ));
        }
        renderer
            .render(template, messages, &self.bindings())
            .map_err(|e| Error::TemplateUnavailable(format!("failed to render chat template: {e}")))
    }

    /// 模板中可用的角色词。
    pub fn bindings(&self) -> Bindings<'_> {
        let config = &self.config;
        Bindings {
            bos_token: config.bos_token.as_deref().unwrap_or(""),
            eos_token: config.eos_token.as_deref().unwrap_or(""),
            pad_token: config.pad_token.as_deref().unwrap_or(""),
            unk_token: config.unk_token.as_deref().unwrap_or(""),
        }
    }

    #[inline]
    pub fn roles(&self) -> Roles {
        self.roles
    }

    #[inline]
    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    #[inline]
    pub fn vocab(&self) -> &Vocab {
        self.bpe.vocab()
    }

    #[inline]
    pub fn is_special(&self, piece: &str) -> bool {
        self.special.is_special(piece)
    }

    pub fn stats(&self) -> Stats {
        Stats {
            vocab_size: self.bpe.vocab().len(),
            merges: self.bpe.ranks().len(),
            added: self.special.added_len(),
            special: self.special.special_len(),
        }
    }

    /// 无法由合词规则从自身字符合成的普通词，不含特殊词和添加词。
    pub fn inaccessible(&self) -> HashMap<&str, utok> {
        let mut ans = self.bpe.inaccessible();
        ans.retain(|piece, _| !self.special.is_verbatim(piece));
        ans
    }
}

impl fmt::Display for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Stats {
            vocab_size,
            merges,
            added,
            special,
        } = self.stats();
        writeln!(f, "Tokenizer(")?;
        let marker = self.bpe.marker();
        writeln!(f, "    marker = {:?} ({:?}),", marker.as_str(), marker.placement())?;
        writeln!(f, "    vocab_size = {vocab_size},")?;
        writeln!(f, "    merges = {merges},")?;
        writeln!(f, "    added_tokens = {added},")?;
        writeln!(f, "    special_tokens = {special},")?;
        write!(f, ")")
    }
}

/// 分词器构造器。
///
/// 所有输入先收集起来，在 [`build`](Self::build) 中按固定顺序组装：
/// 配置 -> 基础词表与合词规则 -> 附加词 -> 特殊词与别名 -> 就绪。
/// 任何一步失败都不会产生分词器。
pub struct TokenizerBuilder {
    config: TokenizerConfig,
    model: ModelArtifact,
    added_vocab: Vec<String>,
    aliases: Vec<(String, String)>,
    marker: Marker,
}

impl TokenizerBuilder {
    pub fn new(model: ModelArtifact) -> Self {
        Self {
            config: TokenizerConfig::default(),
            model,
            added_vocab: Vec::new(),
            aliases: Vec::new(),
            marker: Marker::default(),
        }
    }

    /// 读取模型目录，附加词文件中的词排在宿主程序添加的词之前。
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let ModelDir {
            config,
            model,
            added_vocab,
            ..
        } = load_dir(dir)?;
        Ok(Self::new(model).config(config).added_vocab(added_vocab))
    }

    pub fn config(mut self, config: TokenizerConfig) -> Self {
        self.config = config;
        self
    }

    /// 追加动态添加的词。
    pub fn added_vocab<T: Into<String>>(mut self, pieces: impl IntoIterator<Item = T>) -> Self {
        self.added_vocab.extend(pieces.into_iter().map(Into::into));
        self
    }

    /// 登记别名：输入中的 `external` 按 `canonical` 编码，解码时恢复为 `external`。
    pub fn alias(mut self, external: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.aliases.push((external.into(), canonical.into()));
        self
    }

    pub fn aliases<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.aliases
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn marker(mut self, marker: Marker) -> Self {
        self.marker = marker;
        self
    }

    pub fn build(self) -> Result<Tokenizer> {
        let Self {
            config,
            model,
            added_vocab,
            aliases,
            marker,
        } = self;
        log::debug!(
            "stage {}: {} decoder entries, template {}",
            Stage::ConfigLoaded,
            config.added_tokens_decoder.len(),
            if config.chat_template.is_some() { "present" } else { "absent" },
        );

        let ModelArtifact {
            vocab,
            merges,
            added_tokens,
        } = model;
        if vocab.is_empty() {
            return Err(Error::missing(Stage::VocabularyLoaded, "base vocabulary is empty"));
        }
        let ranks = MergeRanks::parse(merges)?;
        let mut builder = VocabBuilder::default();
        builder.base(vocab);
        log::debug!("stage {}: {} merges", Stage::VocabularyLoaded, ranks.len());

        let (special, plain): (Vec<_>, Vec<_>) = config
            .added_tokens_decoder
            .iter()
            .chain(&added_tokens)
            .partition(|t| t.special);
        builder
            .special(special.into_iter().map(|t| (t.content.clone(), t.id)))
            .plain(plain.into_iter().map(|t| (t.content.clone(), t.id)))
            .added(added_vocab);
        log::debug!("stage {}", Stage::AddedTokensLoaded);

        builder.added(aliases.iter().map(|(_, canonical)| canonical.clone()));
        let aliases = Aliases::new(aliases);
        let layered = builder.build()?;
        let special = SpecialTokens::new(
            &layered.special,
            &layered.added,
            &aliases,
            &layered.vocab,
            &marker,
        );
        let roles = resolve_roles(&config, &special, &layered.vocab);
        log::debug!(
            "stage {}: {} special, {} added, {} aliases, roles {roles:?}",
            Stage::SpecialTokensMerged,
            special.special_len(),
            special.added_len(),
            aliases.len(),
        );

        let tokenizer = Tokenizer {
            bpe: Bpe::new(layered.vocab, ranks, marker, roles.unk),
            special,
            aliases,
            roles,
            config,
        };
        log::debug!("stage {}: {:?}", Stage::Ready, tokenizer.stats());
        Ok(tokenizer)
    }
}

fn resolve_roles(config: &TokenizerConfig, special: &SpecialTokens, vocab: &Vocab) -> Roles {
    let resolve = |name: &str, piece: &Option<String>| {
        let piece = piece.as_deref()?;
        let token = special.special_id(piece).or_else(|| vocab.id_of(piece));
        if token.is_none() {
            log::warn!("{name} {piece:?} is not in vocab, left unbound");
        }
        token
    };
    Roles {
        bos: resolve("bos_token", &config.bos_token),
        eos: resolve("eos_token", &config.eos_token),
        pad: resolve("pad_token", &config.pad_token),
        unk: resolve("unk_token", &config.unk_token),
    }
}
