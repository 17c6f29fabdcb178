//! Visibility of a bound element.

use std::fmt;

/// Whether a bound element is shown, hidden but laid out, or removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Visibility {
    Visible,
    /// Hidden, still occupying space. This is the fallback when a visibility
    /// binding has no value.
    #[default]
    Invisible,
    /// Hidden and taking no space.
    Gone,
}

impl Visibility {
    /// `Visible` when `flag` holds, otherwise `Invisible`.
    #[must_use]
    pub fn from_flag(flag: bool) -> Self {
        if flag { Self::Visible } else { Self::Invisible }
    }

    /// `Invisible` when `flag` holds, otherwise `Visible`.
    ///
    /// Handy for "hide the list while loading" style bindings.
    #[must_use]
    pub fn inverse_of(flag: bool) -> Self {
        Self::from_flag(!flag)
    }

    /// `Visible` when `flag` holds, otherwise `Gone`.
    #[must_use]
    pub fn collapse_unless(flag: bool) -> Self {
        if flag { Self::Visible } else { Self::Gone }
    }

    #[must_use]
    pub fn is_visible(self) -> bool {
        self == Self::Visible
    }

    /// Whether the element still takes up space.
    #[must_use]
    pub fn occupies_space(self) -> bool {
        self != Self::Gone
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Visible => "visible",
            Self::Invisible => "invisible",
            Self::Gone => "gone",
        };
        f.write_str(name)
    }
}
