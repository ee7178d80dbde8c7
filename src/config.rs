//! 分词器的外部输入：`tokenizer.json` 中的模型数据和 `tokenizer_config.json` 中的元信息。
//!
//! 这里只定义数据形态和结构校验，读文件在 [`crate::loader`] 中完成。

use crate::{merges::RawMerge, utok, Error, Result, Stage};
use serde::Deserialize;
use std::collections::HashMap;

/// 附加词，来自 `tokenizer.json` 的 `added_tokens` 或配置的 `added_tokens_decoder`。
#[derive(Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct AddedToken {
    pub id: utok,
    pub content: String,
    #[serde(default)]
    pub special: bool,
}

/// 训练得到的模型数据。
#[derive(Clone, Default, Debug)]
pub struct ModelArtifact {
    /// 基础词表，按序号排序
    pub vocab: Vec<(String, utok)>,
    /// 合词规则，顺序即排名
    pub merges: Vec<RawMerge>,
    pub added_tokens: Vec<AddedToken>,
}

#[derive(Deserialize)]
pub(crate) struct RawModelArtifact {
    #[serde(default)]
    added_tokens: Vec<AddedToken>,
    model: Option<RawModel>,
}

#[derive(Deserialize)]
struct RawModel {
    vocab: Option<HashMap<String, utok>>,
    merges: Option<Vec<RawMerge>>,
}

impl ModelArtifact {
    pub(crate) fn from_raw(raw: RawModelArtifact) -> Result<Self> {
        const STAGE: Stage = Stage::VocabularyLoaded;
        let RawModelArtifact {
            added_tokens,
            model,
        } = raw;
        let model = model.ok_or_else(|| Error::missing(STAGE, "`model` section"))?;
        let vocab = model
            .vocab
            .ok_or_else(|| Error::missing(STAGE, "`model.vocab`"))?;
        let merges = model
            .merges
            .ok_or_else(|| Error::missing(STAGE, "`model.merges`"))?;

        let mut vocab = vocab.into_iter().collect::<Vec<_>>();
        vocab.sort_unstable_by_key(|&(_, id)| id);
        Ok(Self {
            vocab,
            merges,
            added_tokens,
        })
    }
}

/// 填充方向，仅作记录，本 crate 不做填充。
#[derive(Deserialize, Clone, Copy, PartialEq, Eq, Default, Debug)]
#[serde(rename_all = "lowercase")]
pub enum PaddingSide {
    Left,
    #[default]
    Right,
}

/// 分词器元信息。构造后不可变，作为参数传给构造器，而不是在调用时按名字查找。
#[derive(Clone, Default, Debug)]
pub struct TokenizerConfig {
    /// 带有固定序号的附加词，按序号排序
    pub added_tokens_decoder: Vec<AddedToken>,
    pub bos_token: Option<String>,
    pub eos_token: Option<String>,
    pub pad_token: Option<String>,
    pub unk_token: Option<String>,
    pub chat_template: Option<String>,
    pub padding_side: PaddingSide,
}

#[derive(Deserialize)]
pub(crate) struct RawTokenizerConfig {
    #[serde(default)]
    added_tokens_decoder: HashMap<String, RawDecoderEntry>,
    #[serde(default)]
    bos_token: Option<RoleToken>,
    #[serde(default)]
    eos_token: Option<RoleToken>,
    #[serde(default)]
    pad_token: Option<RoleToken>,
    #[serde(default)]
    unk_token: Option<RoleToken>,
    #[serde(default)]
    chat_template: Option<ChatTemplateField>,
    #[serde(default)]
    padding_side: PaddingSide,
}

#[derive(Deserialize)]
struct RawDecoderEntry {
    content: String,
    #[serde(default)]
    special: bool,
}

/// 角色词可以是字符串，也可以是带 `content` 字段的对象。
#[derive(Deserialize)]
#[serde(untagged)]
enum RoleToken {
    Plain(String),
    Object { content: String },
}

/// 对话模板可以是单个字符串，也可以是命名模板的列表。
#[derive(Deserialize)]
#[serde(untagged)]
enum ChatTemplateField {
    Single(String),
    Named(Vec<NamedTemplate>),
}

#[derive(Deserialize)]
struct NamedTemplate {
    name: String,
    template: String,
}

impl TokenizerConfig {
    pub(crate) fn from_raw(raw: RawTokenizerConfig) -> Result<Self> {
        let RawTokenizerConfig {
            added_tokens_decoder,
            bos_token,
            eos_token,
            pad_token,
            unk_token,
            chat_template,
            padding_side,
        } = raw;

        let mut decoder = added_tokens_decoder
            .into_iter()
            .map(|(key, RawDecoderEntry { content, special })| {
                let id = key.parse::<utok>().map_err(|_| {
                    Error::malformed(
                        Stage::ConfigLoaded,
                        format!("added_tokens_decoder key {key:?} is not a token id"),
                    )
                })?;
                Ok(AddedToken {
                    id,
                    content,
                    special,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        decoder.sort_unstable_by_key(|t| t.id);

        let role = |token: Option<RoleToken>| match token {
            Some(RoleToken::Plain(s) | RoleToken::Object { content: s }) if !s.is_empty() => {
                Some(s)
            }
            _ => None,
        };
        let chat_template = match chat_template {
            Some(ChatTemplateField::Single(s)) => Some(s),
            Some(ChatTemplateField::Named(list)) => {
                let mut default = None;
                let mut first = None;
                for NamedTemplate { name, template } in list {
                    if name == "default" {
                        default = Some(template);
                    } else if first.is_none() {
                        first = Some(template);
                    }
                }
                default.or(first)
            }
            None => None,
        };

        Ok(Self {
            added_tokens_decoder: decoder,
            bos_token: role(bos_token),
            eos_token: role(eos_token),
            pad_token: role(pad_token),
            unk_token: role(unk_token),
            chat_template,
            padding_side,
        })
    }
}

/// 角色到序号的绑定。
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Roles {
    pub bos: Option<utok>,
    pub eos: Option<utok>,
    pub pad: Option<utok>,
    pub unk: Option<utok>,
}
