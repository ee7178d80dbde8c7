//! 基于合词排名的 bpe 分词器。
//!
//! 词表、合词规则、特殊词和别名在构造时一次性组装，之后分词器不可变，
//! 编码和解码都是对这份状态的纯函数，可以在任意多个线程中并发调用。

#![deny(warnings)]

mod alias;
mod bpe;
mod config;
mod error;
mod merges;
mod special;
mod template;
mod tokenizer;
mod vocab;

pub mod loader;

pub use alias::Aliases;
pub use bpe::{Bpe, Marker, MergeState, Placement, SPIECE_UNDERLINE};
pub use config::{AddedToken, ModelArtifact, PaddingSide, Roles, TokenizerConfig};
pub use error::{Error, Result, Stage};
pub use merges::{MergeRanks, MergeRule, RawMerge};
pub use special::{Atom, Segment, SpecialTokens};
pub use template::{Bindings, ChatMessage, TemplateRenderer};
pub use tokenizer::{Stats, Tokenizer, TokenizerBuilder};
pub use vocab::{Layered, Vocab, VocabBuilder};

/// `utok` for token id.
#[allow(non_camel_case_types)]
pub type utok = u32;
