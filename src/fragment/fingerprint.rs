use std::any::type_name;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock};

/// Lazily memoized fingerprint of the fragment that owns it.
///
/// The slot is either empty or holds the fingerprint computed from the owner's current content.
/// It is invisible to hashing and equality so that two fragments with the same content always
/// hash the same whether or not either has been fingerprinted yet.
#[derive(Default)]
pub struct FingerprintSlot {
    value: RwLock<Option<Arc<str>>>,
}

impl FingerprintSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the memoized fingerprint, computing and storing it on first use.
    ///
    /// Concurrent first calls may each run `compute`; the first stored value wins and every
    /// caller sees that one.
    pub fn get_or_init(&self, compute: impl FnOnce() -> String) -> Arc<str> {
        if let Some(existing) = self.peek() {
            return existing;
        }
        let computed: Arc<str> = Arc::from(compute());
        let mut guard = self.value.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(guard.get_or_insert(computed))
    }

    #[must_use]
    pub fn peek(&self) -> Option<Arc<str>> {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(Arc::clone)
    }

    /// Forget the memoized fingerprint; the next request recomputes it.
    pub fn reset(&self) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Clone for FingerprintSlot {
    fn clone(&self) -> Self {
        Self {
            value: RwLock::new(self.peek()),
        }
    }
}

impl fmt::Debug for FingerprintSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.peek() {
            Some(value) => f.debug_tuple("FingerprintSlot").field(&value).finish(),
            None => f.write_str("FingerprintSlot(<empty>)"),
        }
    }
}

impl Hash for FingerprintSlot {
    fn hash<H: Hasher>(&self, _state: &mut H) {}
}

impl PartialEq for FingerprintSlot {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for FingerprintSlot {}

/// Kind identifier plus structural hash of `value`.
#[must_use]
pub fn fingerprint_of<T: Hash + ?Sized>(value: &T) -> String {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    format!("{}:{:016x}", type_name::<T>(), hasher.finish())
}
