//! A slot that remembers whether it was ever written.
//!
//! [`Tristate<T>`] distinguishes "never set" from "set, then cleared". Action
//! channels rely on the difference: a newly attached observer is not replayed
//! an [`Unset`](Tristate::Unset) slot, while a [`Cleared`](Tristate::Cleared)
//! one tells it the last run is over.

/// `Unset` until the first write, `Set(value)` while holding a value, and
/// `Cleared` once a held value has been withdrawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tristate<T> {
    /// Never written.
    Unset,
    /// Holding a value.
    Set(T),
    /// Written at least once, currently empty.
    Cleared,
}

impl<T> Default for Tristate<T> {
    fn default() -> Self {
        Self::Unset
    }
}

impl<T> Tristate<T> {
    /// Store `value`.
    pub fn set(&mut self, value: T) {
        *self = Self::Set(value);
    }

    /// Withdraw the held value. An `Unset` slot stays `Unset`.
    ///
    /// Returns `true` if a value was withdrawn.
    pub fn clear(&mut self) -> bool {
        match self {
            Self::Set(_) => {
                *self = Self::Cleared;
                true
            }
            Self::Unset | Self::Cleared => false,
        }
    }

    /// Withdraw and return the held value.
    pub fn take(&mut self) -> Option<T> {
        match std::mem::replace(self, Self::Cleared) {
            Self::Set(value) => Some(value),
            Self::Unset => {
                *self = Self::Unset;
                None
            }
            Self::Cleared => None,
        }
    }

    /// The held value, if any.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        match self {
            Self::Set(value) => Some(value),
            Self::Unset | Self::Cleared => None,
        }
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }

    #[must_use]
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    #[must_use]
    pub fn is_cleared(&self) -> bool {
        matches!(self, Self::Cleared)
    }

    /// Whether the slot was ever written (`Set` or `Cleared`).
    #[must_use]
    pub fn has_been_set(&self) -> bool {
        !self.is_unset()
    }

    #[must_use]
    pub fn as_ref(&self) -> Tristate<&T> {
        match self {
            Self::Unset => Tristate::Unset,
            Self::Set(value) => Tristate::Set(value),
            Self::Cleared => Tristate::Cleared,
        }
    }

    /// Transform the held value, keeping the state.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Tristate<U> {
        match self {
            Self::Unset => Tristate::Unset,
            Self::Set(value) => Tristate::Set(f(value)),
            Self::Cleared => Tristate::Cleared,
        }
    }

    /// Drop the set/cleared distinction.
    #[must_use]
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Set(value) => Some(value),
            Self::Unset | Self::Cleared => None,
        }
    }
}

impl<T> From<Option<T>> for Tristate<T> {
    /// `Some` becomes `Set`; `None` becomes `Cleared`, since an explicit
    /// `None` is a write.
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::Set(value),
            None => Self::Cleared,
        }
    }
}

/// A value that may or may not carry a payload.
///
/// Lets [`SourceExt::skip_unset`](crate::operators::SourceExt::skip_unset)
/// work over both `Tristate` and `Option` streams.
pub trait Presence {
    /// The payload type.
    type Inner;

    /// The payload, if present.
    fn present(self) -> Option<Self::Inner>;
}

impl<T> Presence for Tristate<T> {
    type Inner = T;

    fn present(self) -> Option<T> {
        self.into_option()
    }
}

impl<T> Presence for Option<T> {
    type Inner = T;

    fn present(self) -> Option<T> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn starts_unset() {
        let slot: Tristate<u8> = Tristate::default();
        assert!(slot.is_unset());
        assert!(!slot.has_been_set());
        assert_eq!(slot.get(), None);
    }

    #[test]
    fn clear_distinguishes_from_unset() {
        let mut slot = Tristate::Unset;
        assert!(!slot.clear());
        assert!(slot.is_unset());

        slot.set(4);
        assert!(slot.clear());
        assert!(slot.is_cleared());
        assert!(slot.has_been_set());
        assert!(!slot.clear());
    }

    #[test]
    fn take_leaves_cleared() {
        let mut slot = Tristate::Set("x");
        assert_eq!(slot.take(), Some("x"));
        assert!(slot.is_cleared());
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn take_on_unset_stays_unset() {
        let mut slot: Tristate<i32> = Tristate::Unset;
        assert_eq!(slot.take(), None);
        assert!(slot.is_unset());
    }

    #[test]
    fn from_option() {
        assert_eq!(Tristate::from(Some(1)), Tristate::Set(1));
        assert_eq!(Tristate::<i32>::from(None), Tristate::Cleared);
    }

    proptest! {
        #[test]
        fn map_preserves_state(value in any::<i64>(), pick in 0u8..3) {
            let slot = match pick {
                0 => Tristate::Unset,
                1 => Tristate::Set(value),
                _ => Tristate::Cleared,
            };
            let mapped = slot.map(|v| v.wrapping_mul(2));
            prop_assert_eq!(mapped.is_set(), slot.is_set());
            prop_assert_eq!(mapped.is_unset(), slot.is_unset());
            prop_assert_eq!(mapped.into_option(), slot.into_option().map(|v| v.wrapping_mul(2)));
        }

        #[test]
        fn has_been_set_tracks_any_write(
            writes in proptest::collection::vec(proptest::option::of(any::<u8>()), 1..16)
        ) {
            let mut slot = Tristate::Unset;
            for write in &writes {
                match write {
                    Some(v) => slot.set(*v),
                    None => {
                        slot.clear();
                    }
                }
            }
            let ever_set = writes.iter().any(Option::is_some);
            prop_assert_eq!(slot.has_been_set(), ever_set);
        }
    }
}
