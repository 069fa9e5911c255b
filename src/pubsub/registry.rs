use std::{collections::HashMap, sync::Arc};

use ahash::{AHashMap, AHashSet, RandomState};

use super::{
    subscription::{Subscription, SubscriptionId},
    Listener,
};
use crate::channel::{is_descendant_or_self, unique_ancestors, ChannelToken, TokenKey};

/// Подписки под одним токеном в порядке регистрации.
#[derive(Debug)]
struct Entry {
    token: ChannelToken,
    subscriptions: Vec<Arc<Subscription>>,
}

impl Entry {
    fn release(self) {
        drop(self.subscriptions);
        self.token.release();
    }
}

/// Подписка, выбранная для доставки, и токен, через который она совпала.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub(crate) rank: usize,
    pub(crate) token: ChannelToken,
    pub(crate) subscription: Arc<Subscription>,
}

/// Отображение токен → подписки. Пустые записи не хранятся.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    entries: HashMap<TokenKey, Entry, RandomState>,
    next_id: u64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next_id(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }

    pub(crate) fn insert(
        &mut self,
        token: ChannelToken,
        subscription: Arc<Subscription>,
    ) {
        self.entries
            .entry(token.key())
            .or_insert_with(|| Entry {
                token,
                subscriptions: Vec::new(),
            })
            .subscriptions
            .push(subscription);
    }

    /// Удаляет одну подписку из указанных записей.
    pub(crate) fn remove_subscription(
        &mut self,
        keys: &[TokenKey],
        id: SubscriptionId,
    ) -> bool {
        let mut removed = false;
        for key in keys {
            if let Some(entry) = self.entries.get_mut(key) {
                let before = entry.subscriptions.len();
                entry.subscriptions.retain(|sub| sub.id != id);
                removed |= entry.subscriptions.len() != before;
                if entry.subscriptions.is_empty() {
                    self.remove_key(key);
                }
            }
        }
        removed
    }

    /// Удаляет запись целиком.
    pub(crate) fn remove_key(
        &mut self,
        key: &TokenKey,
    ) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                entry.release();
                true
            }
            None => false,
        }
    }

    /// Удаляет все подписки `listener`, где бы они ни были зарегистрированы.
    pub(crate) fn remove_listener(
        &mut self,
        listener: &Listener,
    ) -> bool {
        let mut removed = false;
        let mut emptied = Vec::new();
        for (key, entry) in self.entries.iter_mut() {
            let before = entry.subscriptions.len();
            entry
                .subscriptions
                .retain(|sub| !sub.listener.same(listener));
            removed |= entry.subscriptions.len() != before;
            if entry.subscriptions.is_empty() {
                emptied.push(key.clone());
            }
        }
        for key in &emptied {
            self.remove_key(key);
        }
        removed
    }

    /// Подписки, до которых доходит publish в `targets`: сначала самый
    /// глубокий канал, внутри одного ранга в порядке регистрации.
    ///
    /// Точные токены и glob проверяются по предкам целей, regex только по
    /// самим целям.
    pub(crate) fn publish_candidates(
        &self,
        targets: &[String],
    ) -> Vec<Candidate> {
        let ancestors = unique_ancestors(targets);
        let rank_of: AHashMap<&str, usize> = ancestors
            .iter()
            .enumerate()
            .map(|(rank, channel)| (channel.as_str(), rank))
            .collect();

        let mut out = Vec::new();
        for entry in self.entries.values() {
            let rank = match &entry.token {
                ChannelToken::Exact(channel) => rank_of.get(&**channel).copied(),
                ChannelToken::Glob(pattern) => ancestors.iter().position(|a| pattern.matches(a)),
                ChannelToken::Pattern(regex) => targets
                    .iter()
                    .filter(|target| regex.is_match(target))
                    .filter_map(|target| rank_of.get(target.as_str()).copied())
                    .min(),
            };
            if let Some(rank) = rank {
                push_entry(&mut out, entry, rank);
            }
        }

        out.sort_by_key(|c| (c.rank, c.subscription.id));
        out
    }

    /// Подписки, до которых доходит broadcast в `targets`, в порядке
    /// регистрации. Regex-подписки broadcast не получают.
    pub(crate) fn broadcast_candidates(
        &self,
        targets: &[String],
    ) -> Vec<Candidate> {
        let mut out = Vec::new();
        for entry in self.entries.values() {
            let reached = match &entry.token {
                ChannelToken::Exact(channel) => targets
                    .iter()
                    .any(|target| is_descendant_or_self(channel, target)),
                ChannelToken::Glob(pattern) => targets
                    .iter()
                    .any(|target| pattern.matches_descendant_or_self(target)),
                ChannelToken::Pattern(_) => false,
            };
            if reached {
                push_entry(&mut out, entry, 0);
            }
        }

        out.sort_by_key(|c| c.subscription.id);
        out
    }

    /// Число различных подписок.
    pub(crate) fn subscription_count(&self) -> usize {
        self.entries
            .values()
            .flat_map(|entry| entry.subscriptions.iter().map(|sub| sub.id))
            .collect::<AHashSet<_>>()
            .len()
    }

    /// Число непустых записей (каналы, glob и regex).
    pub(crate) fn channel_count(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn contains(
        &self,
        key: &TokenKey,
    ) -> bool {
        self.entries.contains_key(key)
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.release();
        }
    }
}

fn push_entry(
    out: &mut Vec<Candidate>,
    entry: &Entry,
    rank: usize,
) {
    out.extend(entry.subscriptions.iter().map(|sub| Candidate {
        rank,
        token: entry.token.clone(),
        subscription: sub.clone(),
    }));
}

#[cfg(test)]
mod tests {
    use regex::Regex;

    use super::*;
    use crate::{channel::ChannelSpec, filter::Filter};

    fn add(
        registry: &mut Registry,
        channel: impl Into<ChannelSpec>,
        listener: &Listener,
    ) -> SubscriptionId {
        let token = ChannelToken::parse(&channel.into()).unwrap();
        let id = registry.next_id();
        registry.insert(
            token,
            Arc::new(Subscription {
                id,
                listener: listener.clone(),
                filter: Filter::empty(),
            }),
        );
        id
    }

    fn channels(candidates: &[Candidate]) -> Vec<String> {
        candidates.iter().map(|c| c.token.to_string()).collect()
    }

    /// Тест проверяет порядок доставки publish: от глубокого к корню.
    #[test]
    fn publish_orders_deepest_first() {
        let mut registry = Registry::new();
        let l = Listener::new(|_| {});
        add(&mut registry, "/", &l);
        add(&mut registry, "/a", &l);
        add(&mut registry, "/a/b", &l);
        add(&mut registry, "/a/b/c/d", &l);
        add(&mut registry, "/x", &l);

        let found = registry.publish_candidates(&["/a/b/c".to_string()]);
        assert_eq!(channels(&found), vec!["/a/b", "/a", "/"]);
    }

    #[test]
    fn globs_rank_by_the_ancestor_they_match() {
        let mut registry = Registry::new();
        let l = Listener::new(|_| {});
        add(&mut registry, "/*", &l);
        add(&mut registry, "/a/*", &l);

        let found = registry.publish_candidates(&["/a/b".to_string()]);
        assert_eq!(channels(&found), vec!["/a/*", "/*"]);
    }

    #[test]
    fn regexes_only_see_the_original_targets() {
        let mut registry = Registry::new();
        let l = Listener::new(|_| {});
        add(&mut registry, Regex::new("^/a$").unwrap(), &l);
        add(&mut registry, Regex::new("^/a/b$").unwrap(), &l);

        let found = registry.publish_candidates(&["/a/b".to_string()]);
        assert_eq!(channels(&found), vec!["^/a/b$"]);
        assert!(registry.broadcast_candidates(&["/a".to_string()]).is_empty());
    }

    #[test]
    fn broadcast_reaches_descendants_in_registration_order() {
        let mut registry = Registry::new();
        let l = Listener::new(|_| {});
        add(&mut registry, "/test/1/2", &l);
        add(&mut registry, "/test", &l);
        add(&mut registry, "/testing", &l);
        add(&mut registry, "/test/*", &l);

        let found = registry.broadcast_candidates(&["/test".to_string()]);
        assert_eq!(channels(&found), vec!["/test/1/2", "/test", "/test/*"]);
    }

    /// Тест проверяет, что пустые записи удаляются.
    #[test]
    fn removal_prunes_empty_entries() {
        let mut registry = Registry::new();
        let a = Listener::new(|_| {});
        let b = Listener::new(|_| {});
        let id = add(&mut registry, "/a", &a);
        add(&mut registry, "/a", &b);
        add(&mut registry, "/b", &a);
        assert_eq!(registry.channel_count(), 2);
        assert_eq!(registry.subscription_count(), 3);

        let key = TokenKey::Path(Arc::from("/a"));
        assert!(registry.remove_subscription(std::slice::from_ref(&key), id));
        assert!(!registry.remove_subscription(std::slice::from_ref(&key), id));
        assert!(registry.contains(&key));

        assert!(registry.remove_listener(&b));
        assert!(!registry.contains(&key));
        assert_eq!(registry.channel_count(), 1);

        assert!(registry.remove_key(&TokenKey::Path(Arc::from("/b"))));
        assert_eq!(registry.channel_count(), 0);
        assert!(!registry.remove_listener(&a));
    }

    /// Тест проверяет, что после удаления подписок каналы и шаблоны не
    /// остаются в пулах.
    #[test]
    fn removed_entries_leave_the_pools() {
        let mut registry = Registry::new();
        let l = Listener::new(|_| {});
        for i in 0..1000 {
            let channel = format!("/registry-pool/{i}");
            let id = add(&mut registry, channel.as_str(), &l);
            let key = TokenKey::Path(Arc::from(channel.as_str()));
            assert!(registry.remove_subscription(std::slice::from_ref(&key), id));
            assert!(!crate::channel::channel_is_pooled(&channel));
        }
        assert_eq!(registry.channel_count(), 0);

        add(&mut registry, "/registry-pool/*", &l);
        add(&mut registry, "/registry-pool/kept", &l);
        assert!(registry.remove_listener(&l));
        assert!(!crate::channel::pattern_is_pooled("/registry-pool/*"));
        assert!(!crate::channel::channel_is_pooled("/registry-pool/kept"));

        add(&mut registry, "/registry-pool/dropped", &l);
        drop(registry);
        assert!(!crate::channel::channel_is_pooled("/registry-pool/dropped"));
    }
}
