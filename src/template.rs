//! 对话模板的渲染接口。
//!
//! 分词器不解释模板语法，只检查模板是否存在、是否像一个模板，
//! 然后把模板、对话和角色词交给调用方提供的渲染器。

use regex::Regex;
use std::{fmt, sync::LazyLock};

/// 对话中的一条消息。
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ChatMessage {
    /// `"system"`、`"user"`、`"assistant"` 等
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// 传给模板的角色词，未配置的角色为空字符串。
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Bindings<'a> {
    pub bos_token: &'a str,
    pub eos_token: &'a str,
    pub pad_token: &'a str,
    pub unk_token: &'a str,
}

impl<'a> Bindings<'a> {
    /// 以模板变量名遍历。
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &'a str)> {
        [
            ("bos_token", self.bos_token),
            ("eos_token", self.eos_token),
            ("pad_token", self.pad_token),
            ("unk_token", self.unk_token),
        ]
        .into_iter()
    }
}

/// 模板渲染器，由调用方提供。
pub trait TemplateRenderer {
    type Error: fmt::Display;

    fn render(
        &self,
        template: &str,
        messages: &[ChatMessage],
        bindings: &Bindings,
    ) -> Result<String, Self::Error>;
}

/// 模板至少要包含一个表达式、语句或注释的起始符。
pub(crate) fn looks_like_template(template: &str) -> bool {
    static PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{|\{%|\{#").unwrap());
    PATTERN.is_match(template)
}
