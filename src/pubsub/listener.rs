use std::{fmt, sync::Arc};

use super::Message;

type ListenerFn = dyn Fn(&Message) + Send + Sync;

/// A message callback with pointer identity.
///
/// Cloning a `Listener` yields the *same* listener: clones compare equal with
/// [`Listener::same`], are de-duplicated together during delivery and are all
/// removed by one `unsubscribe(listener)`. Two listeners built from separate
/// closures are always different, even if the closures are identical.
#[derive(Clone)]
pub struct Listener(Arc<ListenerFn>);

impl Listener {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invokes the callback.
    pub fn call(
        &self,
        message: &Message,
    ) {
        (self.0)(message)
    }

    /// True iff both handles refer to the same callback.
    pub fn same(
        &self,
        other: &Listener,
    ) -> bool {
        self.id() == other.id()
    }

    /// Address of the shared callback; stable for the listener's lifetime.
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl<F> From<F> for Listener
where
    F: Fn(&Message) + Send + Sync + 'static,
{
    fn from(f: F) -> Self {
        Listener::new(f)
    }
}

impl fmt::Debug for Listener {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Listener({:#x})", self.id())
    }
}
