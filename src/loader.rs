//! 从模型目录读取分词器所需的文件。
//!
//! - `tokenizer_config.json`：必需，元信息；
//! - `tokenizer.json`：必需，词表、合词规则和附加词；
//! - `added_vocab.txt` 或 `added_vocab.json`：可选，动态添加的词。

use crate::{
    config::{RawModelArtifact, RawTokenizerConfig},
    Error, ModelArtifact, Result, Stage, TokenizerConfig,
};
use serde::de::DeserializeOwned;
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const CONFIG_FILE: &str = "tokenizer_config.json";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const ADDED_VOCAB_TXT: &str = "added_vocab.txt";
pub const ADDED_VOCAB_JSON: &str = "added_vocab.json";

/// 模型目录中读出的全部内容。
#[derive(Debug)]
pub struct ModelDir {
    pub config: TokenizerConfig,
    pub model: ModelArtifact,
    pub added_vocab: Vec<String>,
    /// 实际使用的附加词文件
    pub added_vocab_path: Option<PathBuf>,
}

/// 读取模型目录。
pub fn load_dir(dir: impl AsRef<Path>) -> Result<ModelDir> {
    let dir = dir.as_ref();

    let path = require(dir, CONFIG_FILE, Stage::ConfigLoaded)?;
    let config = TokenizerConfig::from_raw(read_json::<RawTokenizerConfig>(&path)?)?;
    log::debug!("loaded {}", path.display());

    let path = require(dir, TOKENIZER_FILE, Stage::VocabularyLoaded)?;
    let model = ModelArtifact::from_raw(read_json::<RawModelArtifact>(&path)?)?;
    log::debug!(
        "loaded {}: {} vocabs, {} merges, {} added tokens",
        path.display(),
        model.vocab.len(),
        model.merges.len(),
        model.added_tokens.len(),
    );

    let (added_vocab, added_vocab_path) = load_added_vocab(dir)?;

    Ok(ModelDir {
        config,
        model,
        added_vocab,
        added_vocab_path,
    })
}

/// 优先读取 txt 格式（每行一个词，忽略空行），其次是 json 字符串数组。两者都不存在时为空。
fn load_added_vocab(dir: &Path) -> Result<(Vec<String>, Option<PathBuf>)> {
    let txt = dir.join(ADDED_VOCAB_TXT);
    if txt.is_file() {
        let content = fs::read_to_string(&txt).map_err(|source| Error::Io {
            path: txt.clone(),
            source,
        })?;
        let list = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect::<Vec<_>>();
        log::debug!("loaded {}: {} tokens", txt.display(), list.len());
        return Ok((list, Some(txt)));
    }

    let json = dir.join(ADDED_VOCAB_JSON);
    if json.is_file() {
        let list = read_json::<Vec<String>>(&json)?;
        log::debug!("loaded {}: {} tokens", json.display(), list.len());
        return Ok((list, Some(json)));
    }

    log::debug!("no added vocab file in {}", dir.display());
    Ok((Vec::new(), None))
}

fn require(dir: &Path, name: &str, stage: Stage) -> Result<PathBuf> {
    let path = dir.join(name);
    if path.is_file() {
        Ok(path)
    } else {
        Err(Error::missing(stage, path.display().to_string()))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })
}
