use std::fmt;
use std::marker::PhantomData;

/// A typed handle to a state entry.
///
/// The type parameter fixes what the entry holds, so reads and writes through
/// the same key always agree on the value type.
///
/// ```ignore
/// const FOCUS: StateKey<Option<usize>> = StateKey::new("focusDocument");
/// ```
pub struct StateKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StateKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for StateKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StateKey<T> {}

impl<T> fmt::Debug for StateKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateKey").field(&self.name).finish()
    }
}

impl<T> fmt::Display for StateKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
