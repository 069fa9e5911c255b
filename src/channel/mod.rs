//! Модель каналов: иерархические пути через `/`, glob-шаблоны и токены, под
//! которыми регистрируются подписки.
//!
//! - `path`: нормализация и обход предков/потомков.
//! - `pattern`: посегментные glob-шаблоны (`*`, `**`).
//! - `intern` (приватный): пулы interned каналов и скомпилированных шаблонов.
//! - `token`: каналы в записи вызывающей стороны и токены реестра.

mod intern;
pub mod path;
pub mod pattern;
pub mod token;

#[cfg(test)]
pub(crate) use intern::{channel_is_pooled, pattern_is_pooled};
pub use intern::compile_pattern;
pub use path::{
    ancestors_of, depth, is_descendant_or_self, normalize, parent, unique_ancestors, ROOT,
};
pub use pattern::{is_pattern, CompiledPattern};
pub use token::{resolve_target, ChannelSpec, ChannelToken, Channels, Targets, TokenKey};
