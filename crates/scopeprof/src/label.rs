//! Fixed-capacity label keys.

use std::fmt;
use std::ops::Deref;

use arrayvec::ArrayString;

/// Maximum number of bytes stored for a label.
pub const LABEL_CAPACITY: usize = 63;

/// Inline, allocation-free key identifying a measured code region.
///
/// Labels longer than [`LABEL_CAPACITY`] bytes are truncated at the last
/// character boundary that fits, so two labels sharing a 63-byte prefix
/// resolve to the same aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LabelKey(ArrayString<LABEL_CAPACITY>);

impl LabelKey {
    /// Build a key from an arbitrary string, truncating if needed.
    #[must_use]
    pub fn new(label: &str) -> Self {
        let mut end = label.len().min(LABEL_CAPACITY);
        while !label.is_char_boundary(end) {
            end -= 1;
        }

        let mut buf = ArrayString::new();
        buf.push_str(&label[..end]);
        Self(buf)
    }

    /// The stored label text.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Stored length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the stored label is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for LabelKey {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl Deref for LabelKey {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for LabelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
