// Typed, non-owning object handles
//
// A Handle<T> names one entry in the Device registry for kind T. It never
// owns anything: copying it is free and dropping it does nothing. The
// slotmap key carries a generation, so a handle to a destroyed object never
// resolves to a newer object that reused the slot.

use slotmap::{DefaultKey, Key};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

pub struct Handle<T> {
    key: DefaultKey,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub(crate) fn from_key(key: DefaultKey) -> Self {
        Self {
            key,
            _marker: PhantomData,
        }
    }

    pub(crate) fn key(&self) -> DefaultKey {
        self.key
    }

    /// The "absent" handle. Never resolves to an object.
    pub fn null() -> Self {
        Self::from_key(DefaultKey::null())
    }

    pub fn is_null(&self) -> bool {
        self.key.is_null()
    }
}

// Manual impls: derives would put bounds on T.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = std::any::type_name::<T>();
        let short = name.rsplit("::").next().unwrap_or(name);
        write!(f, "Handle<{}>({:?})", short, self.key.data())
    }
}

/// Opaque backend-side object id. Zero is reserved for "none".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NativeHandle(pub u64);

impl NativeHandle {
    pub const NULL: NativeHandle = NativeHandle(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    struct Dummy;

    #[test]
    fn null_handle_is_default_and_absent() {
        let handle: Handle<Dummy> = Handle::default();
        assert!(handle.is_null());
        assert_eq!(handle, Handle::null());
    }

    #[test]
    fn stale_handle_does_not_alias_reused_slot() {
        let mut map: SlotMap<DefaultKey, u32> = SlotMap::new();
        let first = Handle::<Dummy>::from_key(map.insert(1));
        map.remove(first.key());
        let second = Handle::<Dummy>::from_key(map.insert(2));

        assert_ne!(first, second);
        assert!(map.get(first.key()).is_none());
        assert_eq!(map.get(second.key()), Some(&2));
    }
}
