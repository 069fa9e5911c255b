use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Weak,
};

use dashmap::{mapref::entry::Entry, DashMap};
use once_cell::sync::Lazy;

use super::{path::normalize, pattern::CompiledPattern};
use crate::error::Result;

/// Ниже этого размера пул не подметается целиком.
const SWEEP_FLOOR: usize = 1024;

/// Пул для повторного использования Arc<str> по одинаковым именам каналов.
///
/// Пул держит только `Weak`: строка живёт, пока на неё ссылается хотя бы
/// одна подписка.
static CHANNEL_INTERN: Lazy<WeakPool<str>> = Lazy::new(WeakPool::new);

/// Кэш скомпилированных шаблонов по нормализованной записи. Живёт по тем же
/// правилам, что и пул каналов.
static PATTERN_CACHE: Lazy<WeakPool<CompiledPattern>> = Lazy::new(WeakPool::new);

struct WeakPool<T: ?Sized> {
    entries: DashMap<String, Weak<T>>,
    sweep_at: AtomicUsize,
}

impl<T: ?Sized> WeakPool<T> {
    fn new() -> Self {
        Self {
            entries: DashMap::new(),
            sweep_at: AtomicUsize::new(SWEEP_FLOOR),
        }
    }

    fn get(
        &self,
        key: &str,
    ) -> Option<Arc<T>> {
        self.entries.get(key).and_then(|weak| weak.upgrade())
    }

    /// Возвращает живое значение под `key` или сохраняет новое.
    fn get_or_insert(
        &self,
        key: &str,
        make: impl FnOnce() -> Arc<T>,
    ) -> Arc<T> {
        let fresh = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut slot) => {
                if let Some(existing) = slot.get().upgrade() {
                    return existing;
                }
                let fresh = make();
                slot.insert(Arc::downgrade(&fresh));
                fresh
            }
            Entry::Vacant(slot) => {
                let fresh = make();
                slot.insert(Arc::downgrade(&fresh));
                fresh
            }
        };
        self.maybe_sweep();
        fresh
    }

    /// Убирает запись `key`, если на значение больше никто не ссылается.
    fn release(
        &self,
        key: &str,
    ) {
        self.entries.remove_if(key, |_, weak| weak.strong_count() == 0);
    }

    /// Подметает мёртвые записи, оставшиеся после `release`, пока значение
    /// ещё удерживалось снаружи (например, снимком доставки).
    fn maybe_sweep(&self) {
        if self.entries.len() < self.sweep_at.load(Ordering::Relaxed) {
            return;
        }
        self.entries.retain(|_, weak| weak.strong_count() > 0);
        self.sweep_at
            .store((self.entries.len() * 2).max(SWEEP_FLOOR), Ordering::Relaxed);
    }

    fn contains(
        &self,
        key: &str,
    ) -> bool {
        self.entries.contains_key(key)
    }
}

/// Возвращает interned Arc<str> для данного канала.
/// При первом вызове для нового имени создаёт Arc<str> и сохраняет его в пуле.
#[inline(always)]
pub(crate) fn intern_channel<S: AsRef<str>>(chan: S) -> Arc<str> {
    let key = chan.as_ref();
    if let Some(existing) = CHANNEL_INTERN.get(key) {
        return existing;
    }
    CHANNEL_INTERN.get_or_insert(key, || Arc::from(key))
}

/// Убирает канал из пула, если он больше нигде не используется.
pub(crate) fn release_channel(chan: &str) {
    CHANNEL_INTERN.release(chan);
}

/// Компилирует glob-шаблон канала, переиспользуя живую компиляцию того же
/// шаблона.
///
/// Ключом кэша служит нормализованная запись, поэтому `"/a//*"` и `"/a/*"`
/// делят один matcher.
pub fn compile_pattern(pattern: &str) -> Result<Arc<CompiledPattern>> {
    let normalized = normalize(pattern)?;
    if let Some(existing) = PATTERN_CACHE.get(&normalized) {
        return Ok(existing);
    }

    let compiled = Arc::new(CompiledPattern::new(&normalized)?);
    Ok(PATTERN_CACHE.get_or_insert(&normalized, || compiled))
}

/// Убирает шаблон из кэша, если на него больше никто не ссылается.
pub(crate) fn release_pattern(pattern: &str) {
    PATTERN_CACHE.release(pattern);
}

#[cfg(test)]
pub(crate) fn channel_is_pooled(chan: &str) -> bool {
    CHANNEL_INTERN.contains(chan)
}

#[cfg(test)]
pub(crate) fn pattern_is_pooled(pattern: &str) -> bool {
    PATTERN_CACHE.contains(pattern)
}
