//! 别名：宿主程序可见的外部拼写与词表中规范拼写之间的双向映射。

use std::collections::HashMap;

#[derive(Default, Debug)]
pub struct Aliases {
    canonical: HashMap<String, String>,
    external: HashMap<String, String>,
}

impl Aliases {
    /// 从 `(外部拼写, 规范拼写)` 序列构造。
    ///
    /// 同一个外部拼写出现多次时以最后一次为准；
    /// 多个外部拼写指向同一个规范拼写时，解码恢复为最后登记的那个。
    pub fn new<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut ans = Self::default();
        for (external, canonical) in pairs {
            let (external, canonical) = (external.into(), canonical.into());
            if external.is_empty() || canonical.is_empty() {
                log::warn!("empty alias {external:?} -> {canonical:?} ignored");
                continue;
            }
            if let Some(old) = ans.canonical.insert(external.clone(), canonical.clone()) {
                if ans.external.get(&old) == Some(&external) {
                    ans.external.remove(&old);
                }
            }
            if let Some(old) = ans.external.insert(canonical.clone(), external.clone()) {
                if old != external {
                    log::warn!("{canonical:?} aliased twice, decoding to {external:?}");
                }
            }
        }
        ans
    }

    /// external -> canonical
    #[inline]
    pub fn canonical(&self, external: &str) -> Option<&str> {
        self.canonical.get(external).map(String::as_str)
    }

    /// canonical -> external
    #[inline]
    pub fn external(&self, canonical: &str) -> Option<&str> {
        self.external.get(canonical).map(String::as_str)
    }

    /// 遍历 `(外部拼写, 规范拼写)`，顺序不确定。
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.canonical.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }
}
