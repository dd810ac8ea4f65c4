//! Quality-ranked guessing, used for mod names.
//!
//! Several sources propose a name for a mod being installed (archive name,
//! metadata, the user). Each proposal carries a quality; better-or-equal
//! proposals win, and every distinct proposal is kept as a variant for the
//! name selection in the install dialog.

/// Confidence attached to a guessed value, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Quality {
    #[default]
    Invalid,
    Fallback,
    Good,
    Meta,
    Preset,
    User,
}

/// A value together with the quality of the guess that produced it.
#[derive(Debug, Clone, Default)]
pub struct GuessedValue<T> {
    value: T,
    quality: Quality,
    variants: Vec<T>,
}

impl<T> GuessedValue<T> {
    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    /// Every distinct value proposed so far, in proposal order.
    pub fn variants(&self) -> &[T] {
        &self.variants
    }
}

impl GuessedValue<String> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Propose `value` with the given quality. The proposal is recorded as a
    /// variant, and replaces the current value when its quality is at least
    /// as good. Empty proposals are ignored below [`Quality::User`].
    pub fn update(&mut self, value: &str, quality: Quality) -> &mut Self {
        if value.is_empty() && quality != Quality::User {
            return self;
        }
        if !self.variants.iter().any(|known| known == value) {
            self.variants.push(value.to_string());
        }
        if quality >= self.quality {
            self.value = value.to_string();
            self.quality = quality;
        }
        self
    }
}
