//! Каналы в записи вызывающей стороны и скомпилированные токены, по которым
//! устроен реестр.

use std::{
    collections::{BTreeSet, HashSet},
    fmt,
    hash::BuildHasher,
    sync::Arc,
};

use regex::Regex;

use super::{
    intern::{compile_pattern, intern_channel, release_channel, release_pattern},
    path::normalize,
    pattern::{is_pattern, CompiledPattern},
};
use crate::error::{PubSubError, Result};

/// Канал, переданный в `subscribe` или `unsubscribe`: строка пути (возможно,
/// glob-шаблон) или регулярное выражение.
#[derive(Debug, Clone)]
pub enum ChannelSpec {
    Path(String),
    Regex(Regex),
}

impl From<&str> for ChannelSpec {
    fn from(value: &str) -> Self {
        ChannelSpec::Path(value.to_string())
    }
}

impl From<String> for ChannelSpec {
    fn from(value: String) -> Self {
        ChannelSpec::Path(value)
    }
}

impl From<&String> for ChannelSpec {
    fn from(value: &String) -> Self {
        ChannelSpec::Path(value.clone())
    }
}

impl From<Regex> for ChannelSpec {
    fn from(value: Regex) -> Self {
        ChannelSpec::Regex(value)
    }
}

impl From<&Regex> for ChannelSpec {
    fn from(value: &Regex) -> Self {
        ChannelSpec::Regex(value.clone())
    }
}

/// Один или несколько каналов.
#[derive(Debug, Clone, Default)]
pub struct Channels(pub Vec<ChannelSpec>);

impl Channels {
    pub fn iter(&self) -> impl Iterator<Item = &ChannelSpec> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<ChannelSpec> for Channels {
    fn from(value: ChannelSpec) -> Self {
        Channels(vec![value])
    }
}

impl From<&str> for Channels {
    fn from(value: &str) -> Self {
        Channels(vec![value.into()])
    }
}

impl From<String> for Channels {
    fn from(value: String) -> Self {
        Channels(vec![value.into()])
    }
}

impl From<Regex> for Channels {
    fn from(value: Regex) -> Self {
        Channels(vec![value.into()])
    }
}

impl<T: Into<ChannelSpec>> From<Vec<T>> for Channels {
    fn from(value: Vec<T>) -> Self {
        Channels(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ChannelSpec>, const N: usize> From<[T; N]> for Channels {
    fn from(value: [T; N]) -> Self {
        Channels(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ChannelSpec>, S: BuildHasher> From<HashSet<T, S>> for Channels {
    fn from(value: HashSet<T, S>) -> Self {
        Channels(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ChannelSpec>> From<BTreeSet<T>> for Channels {
    fn from(value: BTreeSet<T>) -> Self {
        Channels(value.into_iter().map(Into::into).collect())
    }
}

/// Цели publish/broadcast: только обычные строки каналов.
///
/// Регулярные выражения в цели не конвертируются вовсе; glob-шаблоны
/// отклоняются при разрешении целей.
#[derive(Debug, Clone, Default)]
pub struct Targets(pub Vec<String>);

impl Targets {
    /// Нормализует каждую цель, отклоняя некорректные каналы и шаблоны.
    pub fn resolve(&self) -> Result<Vec<String>> {
        self.0.iter().map(|channel| resolve_target(channel)).collect()
    }
}

/// Нормализует одну цель publish/broadcast.
pub fn resolve_target(channel: &str) -> Result<String> {
    let normalized = normalize(channel)?;
    if is_pattern(&normalized) {
        return Err(PubSubError::channel_type(
            channel,
            "glob patterns are only valid in subscriptions",
        ));
    }
    Ok(normalized)
}

impl From<&str> for Targets {
    fn from(value: &str) -> Self {
        Targets(vec![value.to_string()])
    }
}

impl From<String> for Targets {
    fn from(value: String) -> Self {
        Targets(vec![value])
    }
}

impl From<&String> for Targets {
    fn from(value: &String) -> Self {
        Targets(vec![value.clone()])
    }
}

impl<T: Into<String>> From<Vec<T>> for Targets {
    fn from(value: Vec<T>) -> Self {
        Targets(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<String>, const N: usize> From<[T; N]> for Targets {
    fn from(value: [T; N]) -> Self {
        Targets(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<String> + Clone> From<&[T]> for Targets {
    fn from(value: &[T]) -> Self {
        Targets(value.iter().cloned().map(Into::into).collect())
    }
}

impl<T: Into<String>, S: BuildHasher> From<HashSet<T, S>> for Targets {
    fn from(value: HashSet<T, S>) -> Self {
        Targets(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<String>> From<BTreeSet<T>> for Targets {
    fn from(value: BTreeSet<T>) -> Self {
        Targets(value.into_iter().map(Into::into).collect())
    }
}

/// Ключ реестра. Точные каналы и glob-шаблоны делят пространство путей (glob
/// всегда содержит `*`); регулярные выражения различаются по исходнику.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TokenKey {
    Path(Arc<str>),
    Regex(Arc<str>),
}

impl TokenKey {
    /// Ключ, под которым был бы зарегистрирован канал. Ничего не интернирует
    /// и не компилирует.
    pub fn from_spec(spec: &ChannelSpec) -> Result<Self> {
        match spec {
            ChannelSpec::Path(channel) => Ok(TokenKey::Path(Arc::from(normalize(channel)?))),
            ChannelSpec::Regex(regex) => Ok(TokenKey::Regex(Arc::from(regex.as_str()))),
        }
    }
}

/// Проверенный и скомпилированный канал подписки.
#[derive(Debug, Clone)]
pub enum ChannelToken {
    Exact(Arc<str>),
    Glob(Arc<CompiledPattern>),
    Pattern(Regex),
}

impl ChannelToken {
    /// Проверяет и компилирует канал.
    pub fn parse(spec: &ChannelSpec) -> Result<Self> {
        match spec {
            ChannelSpec::Path(channel) => {
                if is_pattern(channel) {
                    Ok(ChannelToken::Glob(compile_pattern(channel)?))
                } else {
                    Ok(ChannelToken::Exact(intern_channel(normalize(channel)?)))
                }
            }
            ChannelSpec::Regex(regex) => Ok(ChannelToken::Pattern(regex.clone())),
        }
    }

    /// Ключ владеет своей строкой и не удерживает interned канал.
    pub fn key(&self) -> TokenKey {
        match self {
            ChannelToken::Exact(channel) => TokenKey::Path(Arc::from(&**channel)),
            ChannelToken::Glob(pattern) => TokenKey::Path(pattern.source().clone()),
            ChannelToken::Pattern(regex) => TokenKey::Regex(Arc::from(regex.as_str())),
        }
    }

    /// Отпускает токен и убирает его канал или шаблон из пула, если больше
    /// никто на них не ссылается.
    pub(crate) fn release(self) {
        match self {
            ChannelToken::Exact(channel) => {
                let name = channel.to_string();
                drop(channel);
                release_channel(&name);
            }
            ChannelToken::Glob(pattern) => {
                let source = pattern.as_str().to_string();
                drop(pattern);
                release_pattern(&source);
            }
            ChannelToken::Pattern(_) => {}
        }
    }

    /// Строка канала, шаблон или исходник regex, из которого построен токен.
    pub fn as_str(&self) -> &str {
        match self {
            ChannelToken::Exact(channel) => channel,
            ChannelToken::Glob(pattern) => pattern.as_str(),
            ChannelToken::Pattern(regex) => regex.as_str(),
        }
    }

    /// Является ли конкретный канал этим токеном (exact) или совпадает с ним
    /// (glob, regex).
    pub fn matches_target(
        &self,
        target: &str,
    ) -> bool {
        match self {
            ChannelToken::Exact(channel) => &**channel == target,
            ChannelToken::Glob(pattern) => pattern.matches(target),
            ChannelToken::Pattern(regex) => regex.is_match(target),
        }
    }
}

impl fmt::Display for ChannelToken {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::intern;

    #[test]
    fn parse_distinguishes_exact_glob_and_regex() {
        let exact = ChannelToken::parse(&"/a//b/".into()).unwrap();
        assert!(matches!(exact, ChannelToken::Exact(ref c) if &**c == "/a/b"));

        let glob = ChannelToken::parse(&"/a/*".into()).unwrap();
        assert!(matches!(glob, ChannelToken::Glob(_)));
        assert_eq!(glob.as_str(), "/a/*");

        let regex = ChannelToken::parse(&Regex::new(r"^/a/\d+$").unwrap().into()).unwrap();
        assert!(matches!(regex, ChannelToken::Pattern(_)));
        assert_eq!(regex.key(), TokenKey::Regex(Arc::from(r"^/a/\d+$")));
    }

    #[test]
    fn key_from_spec_matches_parsed_key() {
        for spec in [
            ChannelSpec::from("//a/b/"),
            ChannelSpec::from("/a/*/"),
            ChannelSpec::from(Regex::new("^/a").unwrap()),
        ] {
            let parsed = ChannelToken::parse(&spec).unwrap();
            assert_eq!(TokenKey::from_spec(&spec).unwrap(), parsed.key());
        }
        assert!(TokenKey::from_spec(&"a".into()).is_err());
    }

    /// Тест проверяет, что отпущенный токен уходит из пулов.
    #[test]
    fn release_evicts_pooled_values() {
        let exact = ChannelToken::parse(&"/token/release".into()).unwrap();
        let glob = ChannelToken::parse(&"/token/release/*".into()).unwrap();
        let key = exact.key();
        assert!(intern::channel_is_pooled("/token/release"));
        assert!(intern::pattern_is_pooled("/token/release/*"));

        exact.release();
        glob.release();
        assert!(!intern::channel_is_pooled("/token/release"));
        assert!(!intern::pattern_is_pooled("/token/release/*"));
        assert_eq!(key, TokenKey::Path(Arc::from("/token/release")));
    }

    #[test]
    fn parse_rejects_bad_channels() {
        assert_eq!(
            ChannelToken::parse(&"a/b".into()).unwrap_err(),
            PubSubError::channel_format("a/b")
        );
    }

    #[test]
    fn targets_reject_patterns() {
        let targets = Targets::from(vec!["/a", "/b/*"]);
        assert!(matches!(
            targets.resolve(),
            Err(PubSubError::ChannelType { .. })
        ));

        let ok = Targets::from(["/a/", "//b"]).resolve().unwrap();
        assert_eq!(ok, vec!["/a".to_string(), "/b".to_string()]);
    }

    #[test]
    fn channels_from_mixed_collections() {
        let mixed = Channels::from(vec![
            ChannelSpec::from("/test"),
            ChannelSpec::from(Regex::new("extra").unwrap()),
        ]);
        assert_eq!(mixed.len(), 2);

        let set: BTreeSet<&str> = ["/a", "/b"].into_iter().collect();
        assert_eq!(Channels::from(set).len(), 2);
    }

    #[test]
    fn matches_target_per_kind() {
        let exact = ChannelToken::parse(&"/a".into()).unwrap();
        assert!(exact.matches_target("/a"));
        assert!(!exact.matches_target("/a/b"));

        let glob = ChannelToken::parse(&"/a/*".into()).unwrap();
        assert!(glob.matches_target("/a/b"));

        let regex = ChannelToken::parse(&Regex::new("^/a").unwrap().into()).unwrap();
        assert!(regex.matches_target("/a/b/c"));
    }
}
