//! Operations on plain channel paths.
//!
//! A channel is a `/`-separated path that always starts with `/`. Empty and
//! whitespace-only segments are dropped, so `"//a//b/"` and `"/a/b"` name the
//! same channel. The root channel is `"/"`.

use crate::error::{PubSubError, Result};

/// Separator between channel segments.
pub const SEPARATOR: char = '/';

/// The root channel.
pub const ROOT: &str = "/";

/// Normalizes a channel string.
///
/// Returns [`PubSubError::ChannelFormat`] if the channel does not start with
/// `/`.
///
/// ```
/// use topica::channel::normalize;
///
/// assert_eq!(normalize("//a//b/").unwrap(), "/a/b");
/// assert_eq!(normalize("/").unwrap(), "/");
/// assert!(normalize("a/b").is_err());
/// ```
pub fn normalize(channel: &str) -> Result<String> {
    if !channel.starts_with(SEPARATOR) {
        return Err(PubSubError::channel_format(channel));
    }

    let mut out = String::with_capacity(channel.len());
    for segment in segments(channel) {
        out.push(SEPARATOR);
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push(SEPARATOR);
    }
    Ok(out)
}

/// Non-empty segments of a channel, in order.
pub fn segments(channel: &str) -> impl Iterator<Item = &str> {
    channel
        .split(SEPARATOR)
        .filter(|segment| !segment.trim().is_empty())
}

/// Number of segments in a normalized channel; the root has depth 0.
pub fn depth(channel: &str) -> usize {
    segments(channel).count()
}

/// Parent of a normalized channel, or `None` for the root.
pub fn parent(channel: &str) -> Option<&str> {
    if channel == ROOT {
        return None;
    }
    match channel.rfind(SEPARATOR) {
        Some(0) | None => Some(ROOT),
        Some(idx) => Some(&channel[..idx]),
    }
}

/// Iterator over a channel and all of its ancestors, deepest first.
///
/// The root is yielded exactly once, as the last item.
pub fn ancestors_of(channel: &str) -> Ancestors<'_> {
    Ancestors {
        next: Some(channel),
    }
}

pub struct Ancestors<'a> {
    next: Option<&'a str>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = parent(current);
        Some(current)
    }
}

/// Deduplicated ancestors of several channels.
///
/// Generations are interleaved: every channel's self first, then every
/// parent, and so on. A channel already produced for an earlier input is not
/// repeated.
pub fn unique_ancestors<S: AsRef<str>>(channels: &[S]) -> Vec<String> {
    let mut walkers: Vec<Ancestors<'_>> = channels
        .iter()
        .map(|channel| ancestors_of(channel.as_ref()))
        .collect();
    let mut seen = ahash::AHashSet::new();
    let mut out = Vec::new();

    loop {
        let mut progressed = false;
        for walker in walkers.iter_mut() {
            if let Some(channel) = walker.next() {
                progressed = true;
                if seen.insert(channel) {
                    out.push(channel.to_string());
                }
            }
        }
        if !progressed {
            break;
        }
    }

    out
}

/// True iff `candidate` equals `base` or lies below it at a segment boundary.
pub fn is_descendant_or_self(
    candidate: &str,
    base: &str,
) -> bool {
    if base == ROOT || candidate == base {
        return true;
    }
    candidate
        .strip_prefix(base)
        .is_some_and(|rest| rest.starts_with(SEPARATOR))
}
