//! 分词器的错误类型。

use crate::utok;
use std::{fmt, path::PathBuf};
use thiserror::Error;

/// 以本 crate 的 [`Error`] 为错误类型的 `Result`。
pub type Result<T> = std::result::Result<T, Error>;

/// 构造过程的阶段，标记构造失败发生在哪一步。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Stage {
    ConfigLoaded,
    VocabularyLoaded,
    AddedTokensLoaded,
    SpecialTokensMerged,
    Ready,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::ConfigLoaded => "config",
            Self::VocabularyLoaded => "vocabulary",
            Self::AddedTokensLoaded => "added tokens",
            Self::SpecialTokensMerged => "special tokens",
            Self::Ready => "finalize",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// 构造时缺少必需的文件或结构。
    #[error("missing artifact at {stage} stage: {what}")]
    MissingArtifact { stage: Stage, what: String },

    /// 词表项、合词规则或角色绑定结构非法。
    #[error("malformed artifact at {stage} stage: {reason}")]
    MalformedArtifact { stage: Stage, reason: String },

    /// 编码时某个片段无法对应到词表，且没有配置 unk。
    #[error("unknown token: {0:?}")]
    UnknownToken(String),

    /// 解码时遇到词表中不存在的序号。
    #[error("unknown token id: {0}")]
    UnknownId(utok),

    /// 请求渲染对话但模板不可用。
    #[error("chat template unavailable: {0}")]
    TemplateUnavailable(String),

    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    #[inline]
    pub(crate) fn malformed(stage: Stage, reason: impl Into<String>) -> Self {
        Self::MalformedArtifact {
            stage,
            reason: reason.into(),
        }
    }

    #[inline]
    pub(crate) fn missing(stage: Stage, what: impl Into<String>) -> Self {
        Self::MissingArtifact {
            stage,
            what: what.into(),
        }
    }
}
