use adaptbpe::{
    utok, AddedToken, Bindings, ChatMessage, Error, Marker, ModelArtifact, Placement, RawMerge,
    Stage, Stats, TemplateRenderer, Tokenizer, TokenizerBuilder, TokenizerConfig, SPIECE_UNDERLINE,
};
use std::{collections::HashSet, fs};

const VOCAB: &[&str] = &[
    "<unk>", "<s>", "</s>", "▁", "h", "e", "l", "o", "w", "r", "d", "he", "ll", "llo", "hello",
    "▁hello", "or", "ld", "wor", "world", "▁world", "<tab>", "xy", "<", "|", ">",
];

const MERGES: &[&str] = &[
    "l l", "h e", "ll o", "he llo", "▁ hello", "o r", "l d", "w or", "wor ld", "▁ world", "< |",
];

fn model() -> ModelArtifact {
    ModelArtifact {
        vocab: VOCAB
            .iter()
            .enumerate()
            .map(|(i, s)| (s.to_string(), i as utok))
            .collect(),
        merges: MERGES.iter().map(|s| RawMerge::Joined(s.to_string())).collect(),
        added_tokens: Vec::new(),
    }
}

fn special(id: utok, content: &str) -> AddedToken {
    AddedToken {
        id,
        content: content.into(),
        special: true,
    }
}

fn config() -> TokenizerConfig {
    TokenizerConfig {
        added_tokens_decoder: vec![
            special(0, "<unk>"),
            special(1, "<s>"),
            special(2, "</s>"),
            special(30, "<|endofstring|>"),
        ],
        bos_token: Some("<s>".into()),
        eos_token: Some("</s>".into()),
        ..Default::default()
    }
}

fn builder() -> TokenizerBuilder {
    TokenizerBuilder::new(model()).config(config())
}

fn tokenizer() -> Tokenizer {
    builder().build().unwrap()
}

#[test]
fn round_trip_on_closed_vocab() {
    let tokenizer = tokenizer();
    let ids = tokenizer.encode("hello world", true).unwrap();
    assert_eq!(ids, [14, 20]);
    assert_eq!(tokenizer.decode(&ids).unwrap(), "hello world");

    for text in ["hello", " hello world hello", "world  world"] {
        let ids = tokenizer.encode(text, true).unwrap();
        assert_eq!(tokenizer.decode(&ids).unwrap(), text);
    }
}

#[test]
fn encoding_is_deterministic() {
    let tokenizer = tokenizer();
    let text = "hello world helloworld hell lo";
    let first = tokenizer.encode(text, true).unwrap();
    for _ in 0..8 {
        assert_eq!(tokenizer.encode(text, true).unwrap(), first);
    }
}

#[test]
fn lower_rank_merge_wins() {
    let model = |merges: &[&str]| ModelArtifact {
        vocab: ["a", "b", "c", "d", "ab", "bc"]
            .iter()
            .enumerate()
            .map(|(i, s)| (s.to_string(), i as utok))
            .collect(),
        merges: merges.iter().map(|s| RawMerge::Joined(s.to_string())).collect(),
        added_tokens: Vec::new(),
    };

    // 只有 (b, c) 登记了排名
    let only_bc = TokenizerBuilder::new(model(&["b c"])).build().unwrap();
    assert_eq!(only_bc.encode("abcd", true).unwrap(), [0, 5, 3]);

    let bc_first = TokenizerBuilder::new(model(&["b c", "a b"])).build().unwrap();
    assert_eq!(bc_first.encode("abcd", true).unwrap(), [0, 5, 3]);

    let ab_first = TokenizerBuilder::new(model(&["a b", "b c"])).build().unwrap();
    assert_eq!(ab_first.encode("abcd", true).unwrap(), [4, 2, 3]);
}

#[test]
fn special_tokens_are_atomic() {
    let tokenizer = tokenizer();
    assert_eq!(tokenizer.encode("<|endofstring|>", true).unwrap(), [30]);
    assert_eq!(
        tokenizer.encode("hello<|endofstring|><s> world", true).unwrap(),
        [14, 30, 1, 20]
    );
    assert!(tokenizer.is_special("<|endofstring|>"));
    assert!(!tokenizer.is_special("hello"));

    // 特殊词原样解码，不被跳过
    assert_eq!(tokenizer.decode(&[1, 14, 2]).unwrap(), "<s>hello</s>");
}

#[test]
fn added_tokens_get_fresh_ids() {
    let tokenizer = builder().added_vocab(["<new>"]).build().unwrap();
    assert_eq!(tokenizer.vocab().id_of("<new>"), Some(31));
    let ids = tokenizer.encode("hello<new> world", true).unwrap();
    assert_eq!(ids, [14, 31, 20]);
    assert_eq!(tokenizer.decode(&ids).unwrap(), "hello<new> world");
}

#[test]
fn aliases_are_symmetric() {
    let tokenizer = builder()
        .alias("\t", "<tab>")
        .alias("\n", "<newline>")
        .build()
        .unwrap();
    // "<newline>" 不在词表中，分配新序号
    assert_eq!(tokenizer.vocab().id_of("<newline>"), Some(31));

    let ids = tokenizer.encode("hello\tworld\n", true).unwrap();
    assert_eq!(ids, [14, 21, 19, 31]);
    assert_eq!(tokenizer.decode(&ids).unwrap(), "hello\tworld\n");
    assert_eq!(tokenizer.encode("\t", false).unwrap(), [21]);
    assert_eq!(
        tokenizer.tokenize("hello world\t<s>"),
        ["hello", "▁world", "<tab>", "<s>"]
    );
}

#[test]
fn unknown_ids_and_tokens() {
    let tokenizer = tokenizer();
    assert!(matches!(
        tokenizer.decode(&[14, 9999999]),
        Err(Error::UnknownId(9999999))
    ));
    assert!(matches!(
        tokenizer.encode("hello €", true),
        Err(Error::UnknownToken(piece)) if piece == "€"
    ));
    assert!(matches!(
        tokenizer.encode("nope", false),
        Err(Error::UnknownToken(_))
    ));
    // 失败不影响后续调用
    assert_eq!(tokenizer.encode("hello", true).unwrap(), [14]);

    let lenient = TokenizerBuilder::new(model())
        .config(TokenizerConfig {
            unk_token: Some("<unk>".into()),
            ..config()
        })
        .build()
        .unwrap();
    assert_eq!(lenient.roles().unk, Some(0));
    assert_eq!(lenient.encode("hello €", true).unwrap(), [14, 3, 0]);
}

#[test]
fn added_tokens_never_override_special() {
    let mut model = model();
    model.added_tokens.push(AddedToken {
        id: 41,
        content: "<x>".into(),
        special: false,
    });
    let mut config = config();
    config.added_tokens_decoder.push(special(40, "<x>"));

    let tokenizer = TokenizerBuilder::new(model)
        .config(config)
        .added_vocab(["<x>", "<s>"])
        .build()
        .unwrap();
    assert_eq!(tokenizer.vocab().id_of("<x>"), Some(40));
    assert_eq!(tokenizer.vocab().id_of("<s>"), Some(1));
    assert_eq!(tokenizer.vocab().token_of(41), None);
    assert!(tokenizer.is_special("<x>"));
    assert_eq!(tokenizer.encode("<x><s>", true).unwrap(), [40, 1]);
}

#[test]
fn construction_failures() {
    let mut config = config();
    config.added_tokens_decoder.push(special(14, "<clash>"));
    let err = TokenizerBuilder::new(model()).config(config).build().err();
    assert!(matches!(
        err,
        Some(Error::MalformedArtifact {
            stage: Stage::SpecialTokensMerged,
            ..
        })
    ));

    let mut model = model();
    model.merges.push(RawMerge::Joined("abc".into()));
    let err = TokenizerBuilder::new(model).build().err();
    assert!(matches!(
        err,
        Some(Error::MalformedArtifact {
            stage: Stage::VocabularyLoaded,
            ..
        })
    ));

    let err = TokenizerBuilder::new(ModelArtifact::default()).build().err();
    assert!(matches!(
        err,
        Some(Error::MissingArtifact {
            stage: Stage::VocabularyLoaded,
            ..
        })
    ));
}

#[test]
fn bos_prefixing() {
    let tokenizer = tokenizer();
    assert_eq!(tokenizer.roles().bos, Some(1));
    assert_eq!(tokenizer.roles().eos, Some(2));
    assert_eq!(tokenizer.encode_with_special_tokens("").unwrap(), [1]);
    assert_eq!(tokenizer.encode_with_special_tokens("hello").unwrap(), [1, 14]);
    assert!(tokenizer.encode("", true).unwrap().is_empty());
    assert!(tokenizer.encode("", false).unwrap().is_empty());
}

#[test]
fn prefix_marker_placement() {
    let tokenizer = builder()
        .marker(Marker::new(SPIECE_UNDERLINE, Placement::Prefix))
        .build()
        .unwrap();
    let ids = tokenizer.encode("hello world", true).unwrap();
    assert_eq!(ids, [15, 20]);
    assert_eq!(tokenizer.decode(&ids).unwrap(), "hello world");

    // 特殊词之后的文本仍视为位于开头
    assert_eq!(tokenizer.encode("<s>hello", true).unwrap(), [1, 15]);
    assert_eq!(tokenizer.decode(&[1, 15]).unwrap(), "<s>hello");
    let ids = tokenizer.encode_with_special_tokens("hello").unwrap();
    assert_eq!(ids, [1, 15]);
    assert_eq!(tokenizer.decode(&ids).unwrap(), "<s>hello");
    let ids = tokenizer.encode("<s> hello", true).unwrap();
    assert_eq!(ids, [1, 3, 15]);
    assert_eq!(tokenizer.decode(&ids).unwrap(), "<s> hello");
}

#[test]
fn marker_inside_atoms() {
    let tokenizer = builder()
        .added_vocab(["▁<x>"])
        .alias("▁▁▁▁", "<4>")
        .build()
        .unwrap();
    assert_eq!(tokenizer.vocab().id_of("▁<x>"), Some(31));
    assert_eq!(tokenizer.vocab().id_of("<4>"), Some(32));

    let ids = tokenizer.encode("hello <x>", true).unwrap();
    assert_eq!(ids, [14, 31]);
    assert_eq!(tokenizer.decode(&ids).unwrap(), "hello <x>");
    assert_eq!(tokenizer.decode(&[31]).unwrap(), " <x>");

    let ids = tokenizer.encode("hello    world", true).unwrap();
    assert_eq!(ids, [14, 32, 19]);
    assert_eq!(tokenizer.decode(&ids).unwrap(), "hello    world");
    assert_eq!(tokenizer.encode("    ", false).unwrap(), [32]);
}

struct Concat;

impl TemplateRenderer for Concat {
    type Error = String;

    fn render(
        &self,
        template: &str,
        messages: &[ChatMessage],
        bindings: &Bindings,
    ) -> Result<String, String> {
        if template.contains("fail") {
            return Err("boom".into());
        }
        let mut ans = bindings.bos_token.to_string();
        for m in messages {
            ans.push_str(&m.role);
            ans.push(':');
            ans.push_str(&m.content);
            ans.push_str(bindings.eos_token);
        }
        Ok(ans)
    }
}

#[test]
fn chat_template_gate() {
    let messages = [ChatMessage::new("user", "hi"), ChatMessage::new("assistant", "hello")];

    let err = tokenizer().apply_chat_template(&Concat, &messages).unwrap_err();
    assert!(matches!(err, Error::TemplateUnavailable(_)));

    let with = |template: &str| {
        builder()
            .config(TokenizerConfig {
                chat_template: Some(template.into()),
                ..config()
            })
            .build()
            .unwrap()
    };
    let err = with("no markers here").apply_chat_template(&Concat, &messages).unwrap_err();
    assert!(matches!(err, Error::TemplateUnavailable(_)));

    let err = with("{{ fail }}").apply_chat_template(&Concat, &messages).unwrap_err();
    assert!(matches!(err, Error::TemplateUnavailable(ref msg) if msg.contains("boom")));

    let text = with("{% for m in messages %}{% endfor %}")
        .apply_chat_template(&Concat, &messages)
        .unwrap();
    assert_eq!(text, "<s>user:hi</s>assistant:hello</s>");
}

#[test]
fn introspection() {
    let tokenizer = builder().alias("\t", "<tab>").added_vocab(["<new>"]).build().unwrap();
    assert_eq!(
        tokenizer.stats(),
        Stats {
            vocab_size: VOCAB.len() + 2,
            merges: MERGES.len(),
            added: 2,
            special: 4,
        }
    );
    let inaccessible = tokenizer.inaccessible().into_keys().collect::<HashSet<_>>();
    assert_eq!(inaccessible, HashSet::from(["xy"]));

    let summary = tokenizer.to_string();
    assert!(summary.contains("vocab_size = 28"));
    assert!(summary.contains("merges = 11"));
}

#[test]
fn shared_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Tokenizer>();

    let tokenizer = tokenizer();
    let expected = tokenizer.encode("hello world", true).unwrap();
    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                assert_eq!(tokenizer.encode("hello world", true).unwrap(), expected);
            });
        }
    });
}

#[test]
fn loads_from_model_dir() {
    let dir = std::env::temp_dir().join(format!("adaptbpe_engine_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();

    let vocab = VOCAB
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{s:?}: {i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let merges = MERGES
        .iter()
        .map(|s| format!("{s:?}"))
        .collect::<Vec<_>>()
        .join(", ");
    fs::write(
        dir.join("tokenizer.json"),
        format!(
            r#"{{"added_tokens": [{{"id": 1, "content": "<s>", "special": true}}],
                "model": {{"type": "BPE", "vocab": {{{vocab}}}, "merges": [{merges}]}}}}"#
        ),
    )
    .unwrap();
    fs::write(
        dir.join("tokenizer_config.json"),
        r#"{
            "added_tokens_decoder": {"1": {"content": "<s>", "special": true}},
            "bos_token": "<s>"
        }"#,
    )
    .unwrap();
    fs::write(dir.join("added_vocab.txt"), "<new>\n").unwrap();

    let tokenizer = Tokenizer::from_dir(&dir).unwrap();
    assert_eq!(tokenizer.encode_with_special_tokens("hello<new>").unwrap(), [1, 14, 26]);

    fs::remove_dir_all(dir).ok();
}
