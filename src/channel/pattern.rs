//! Glob-шаблоны каналов.
//!
//! Шаблон сопоставляется посегментно:
//! - `*` соответствует ровно одному сегменту;
//! - `**` соответствует нулю или более целых сегментов;
//! - `*` внутри сегмента (`user-*`) соответствует любой последовательности
//!   символов в пределах этого сегмента;
//! - всё остальное буквально, включая `?`, `[`, `]`, `{` и `}`.
//!
//! Поэтому шаблон с `**` в последнем сегменте совпадает со своим базовым
//! каналом и со всеми его потомками.

use std::{fmt, sync::Arc};

use globset::{GlobBuilder, GlobMatcher};

use super::path::{normalize, segments};
use crate::error::Result;

const WILDCARD_SINGLE: &str = "*";
const WILDCARD_MULTI: &str = "**";

/// Вернёт `true`, если строку канала нужно считать glob-шаблоном.
pub fn is_pattern(channel: &str) -> bool {
    channel.contains('*')
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Single,
    Multi,
    Glob(GlobMatcher),
}

/// Glob для одного сегмента: `*` остаётся подстановкой, всё остальное
/// экранируется. Подряд идущие `*` схлопываются в одну.
fn segment_glob(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len() * 2);
    let mut buf = [0u8; 4];
    let mut after_star = false;
    for ch in segment.chars() {
        if ch == '*' {
            if !after_star {
                out.push('*');
            }
            after_star = true;
        } else {
            out.push_str(&globset::escape(ch.encode_utf8(&mut buf)));
            after_star = false;
        }
    }
    out
}

/// Скомпилированный шаблон канала.
///
/// Обычно получается через [`compile_pattern`](super::compile_pattern),
/// который переиспользует живую компиляцию того же шаблона.
#[derive(Clone)]
pub struct CompiledPattern {
    source: Arc<str>,
    segments: Vec<Segment>,
}

impl CompiledPattern {
    /// Разбирает и компилирует шаблон в обход кэша.
    pub fn new(pattern: &str) -> Result<Self> {
        let normalized = normalize(pattern)?;
        let mut parsed = Vec::new();

        for segment in segments(&normalized) {
            let compiled = match segment {
                WILDCARD_SINGLE => Segment::Single,
                WILDCARD_MULTI => {
                    // `/**/**` is the same as `/**`
                    if matches!(parsed.last(), Some(Segment::Multi)) {
                        continue;
                    }
                    Segment::Multi
                }
                s if s.contains('*') => {
                    let glob = GlobBuilder::new(&segment_glob(s))
                        .literal_separator(true)
                        .backslash_escape(false)
                        .build()?;
                    Segment::Glob(glob.compile_matcher())
                }
                s => Segment::Literal(s.to_string()),
            };
            parsed.push(compiled);
        }

        Ok(Self {
            source: Arc::from(normalized),
            segments: parsed,
        })
    }

    /// Нормализованная строка шаблона.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Разделяемая ссылка на нормализованную строку шаблона.
    pub fn source(&self) -> &Arc<str> {
        &self.source
    }

    /// Полное совпадение с нормализованным каналом.
    pub fn matches(
        &self,
        channel: &str,
    ) -> bool {
        let parts: Vec<&str> = segments(channel).collect();
        self.run(&parts, false)
    }

    /// Совпадает ли шаблон с `base` или каким-либо его потомком.
    ///
    /// Используется broadcast, который идёт вниз от `base` к потомкам.
    pub fn matches_descendant_or_self(
        &self,
        base: &str,
    ) -> bool {
        let parts: Vec<&str> = segments(base).collect();
        self.run(&parts, true)
    }

    /// Посегментное ДП: `table[i][j]` показывает, совпадает ли
    /// `segments[i..]` с `parts[j..]`. В префиксном режиме исчерпанный канал
    /// принимается при любом остатке шаблона: его продолжение всегда может
    /// совпасть.
    fn run(
        &self,
        parts: &[&str],
        prefix: bool,
    ) -> bool {
        let np = self.segments.len();
        let nc = parts.len();
        let width = nc + 1;
        let mut table = vec![false; (np + 1) * width];

        for i in (0..=np).rev() {
            for j in (0..=nc).rev() {
                if i == np {
                    table[i * width + j] = j == nc;
                    continue;
                }
                let value = if j == nc {
                    prefix
                        || (matches!(self.segments[i], Segment::Multi)
                            && table[(i + 1) * width + j])
                } else {
                    match &self.segments[i] {
                        Segment::Multi => table[(i + 1) * width + j] || table[i * width + j + 1],
                        Segment::Single => table[(i + 1) * width + j + 1],
                        Segment::Literal(lit) => {
                            lit == parts[j] && table[(i + 1) * width + j + 1]
                        }
                        Segment::Glob(matcher) => {
                            matcher.is_match(parts[j]) && table[(i + 1) * width + j + 1]
                        }
                    }
                };
                table[i * width + j] = value;
            }
        }

        table[0]
    }
}

impl PartialEq for CompiledPattern {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.source == other.source
    }
}

impl Eq for CompiledPattern {}

impl fmt::Debug for CompiledPattern {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_tuple("CompiledPattern").field(&self.source).finish()
    }
}

impl fmt::Display for CompiledPattern {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.source)
    }
}
