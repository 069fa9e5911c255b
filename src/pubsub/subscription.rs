use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Weak,
    },
};

use parking_lot::RwLock;
use regex::Regex;

use super::{registry::Registry, Listener};
use crate::{
    channel::{ChannelSpec, TokenKey},
    filter::Filter,
};

/// Unique, monotonically increasing id of a subscription within one `PubSub`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub(crate) u64);

impl SubscriptionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// One registration: a listener plus its filter. The same subscription object
/// is stored under every channel it was registered for.
#[derive(Debug)]
pub(crate) struct Subscription {
    pub(crate) id: SubscriptionId,
    pub(crate) listener: Listener,
    pub(crate) filter: Filter,
}

/// Removes the subscription it was returned for.
///
/// Calling [`Unsubscribe::unsubscribe`] more than once is harmless; only the
/// first call can remove anything. Dropping the handle does *not* unsubscribe.
pub struct Unsubscribe {
    registry: Weak<RwLock<Registry>>,
    keys: Vec<TokenKey>,
    id: SubscriptionId,
    done: AtomicBool,
}

impl Unsubscribe {
    pub(crate) fn new(
        registry: Weak<RwLock<Registry>>,
        keys: Vec<TokenKey>,
        id: SubscriptionId,
    ) -> Self {
        Self {
            registry,
            keys,
            id,
            done: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Removes the subscription from every channel it was registered under.
    ///
    /// Returns `true` if this call removed it.
    pub fn unsubscribe(&self) -> bool {
        if self.done.swap(true, Ordering::AcqRel) {
            return false;
        }
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let removed = registry.write().remove_subscription(&self.keys, self.id);
        if removed {
            tracing::debug!(id = %self.id, "subscription removed");
        }
        removed
    }

    /// False once the handle has been used.
    pub fn is_active(&self) -> bool {
        !self.done.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("id", &self.id)
            .field("keys", &self.keys)
            .field("active", &self.is_active())
            .finish()
    }
}

/// What `unsubscribe` removes.
#[derive(Debug, Clone)]
pub enum Selector {
    /// Every subscription registered under exactly this channel, pattern or
    /// regex.
    Channel(ChannelSpec),
    /// Every subscription of this listener, on any channel.
    Listener(Listener),
}

impl From<ChannelSpec> for Selector {
    fn from(value: ChannelSpec) -> Self {
        Selector::Channel(value)
    }
}

impl From<&str> for Selector {
    fn from(value: &str) -> Self {
        Selector::Channel(value.into())
    }
}

impl From<String> for Selector {
    fn from(value: String) -> Self {
        Selector::Channel(value.into())
    }
}

impl From<Regex> for Selector {
    fn from(value: Regex) -> Self {
        Selector::Channel(value.into())
    }
}

impl From<Listener> for Selector {
    fn from(value: Listener) -> Self {
        Selector::Listener(value)
    }
}

impl From<&Listener> for Selector {
    fn from(value: &Listener) -> Self {
        Selector::Listener(value.clone())
    }
}

/// One or many selectors, mixed freely.
#[derive(Debug, Clone, Default)]
pub struct Selectors(pub Vec<Selector>);

impl From<Selector> for Selectors {
    fn from(value: Selector) -> Self {
        Selectors(vec![value])
    }
}

impl From<&str> for Selectors {
    fn from(value: &str) -> Self {
        Selectors(vec![value.into()])
    }
}

impl From<String> for Selectors {
    fn from(value: String) -> Self {
        Selectors(vec![value.into()])
    }
}

impl From<Regex> for Selectors {
    fn from(value: Regex) -> Self {
        Selectors(vec![value.into()])
    }
}

impl From<Listener> for Selectors {
    fn from(value: Listener) -> Self {
        Selectors(vec![value.into()])
    }
}

impl From<&Listener> for Selectors {
    fn from(value: &Listener) -> Self {
        Selectors(vec![value.into()])
    }
}

impl<T: Into<Selector>> From<Vec<T>> for Selectors {
    fn from(value: Vec<T>) -> Self {
        Selectors(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Selector>, const N: usize> From<[T; N]> for Selectors {
    fn from(value: [T; N]) -> Self {
        Selectors(value.into_iter().map(Into::into).collect())
    }
}
