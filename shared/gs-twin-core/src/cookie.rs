//! Cookie / `DynamicObject`: the diagnostic trace identity every object
//! flowing through a [`crate::signal::Signal`] carries.
//!
//! Cookies are not consulted by core semantics — they exist so a signal
//! trace dump or invariant checker can answer "did every fragment of this
//! stamp really descend from the same triangle?" Per the REDESIGN FLAGS
//! guidance this is kept behind the `cookie-trace` feature; with the
//! feature off, [`Cookie`] is a zero-cost unit value.

use crate::MAX_COOKIE_LEVELS;

/// A small stack of monotonically increasing identifiers, one per level of
/// the object's ancestry (e.g. frame, batch, triangle, fragment), plus a
/// color byte and optional ASCII tag used by trace dumpers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cookie {
    levels: [u64; MAX_COOKIE_LEVELS],
    depth: usize,
    color: u8,
    info: Option<&'static str>,
}

impl Cookie {
    /// An empty cookie with no ancestry levels set.
    #[must_use]
    pub const fn root() -> Self {
        Self {
            levels: [0; MAX_COOKIE_LEVELS],
            depth: 0,
            color: 0,
            info: None,
        }
    }

    /// Derives a child cookie that extends this one with one more level of
    /// identity, keeping every ancestor id unchanged.
    ///
    /// # Panics
    /// Panics if this cookie is already at `MAX_COOKIE_LEVELS` depth.
    #[must_use]
    pub fn child(&self, id: u64) -> Self {
        assert!(
            self.depth < MAX_COOKIE_LEVELS,
            "cookie chain exceeded {MAX_COOKIE_LEVELS} levels"
        );
        let mut levels = self.levels;
        levels[self.depth] = id;
        Self {
            levels,
            depth: self.depth + 1,
            color: self.color,
            info: self.info,
        }
    }

    pub fn set_color(&mut self, color: u8) {
        self.color = color;
    }

    pub fn set_info(&mut self, info: &'static str) {
        self.info = Some(info);
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub fn levels(&self) -> &[u64] {
        &self.levels[..self.depth]
    }

    #[must_use]
    pub fn color(&self) -> u8 {
        self.color
    }

    #[must_use]
    pub fn info(&self) -> Option<&'static str> {
        self.info
    }

    /// Whether `self` shares the first `n` ancestry levels with `other` —
    /// the invariant used to check "all fragments of a stamp share the
    /// first N cookies of their parent triangle".
    #[must_use]
    pub fn shares_prefix(&self, other: &Cookie, n: usize) -> bool {
        let n = n.min(self.depth).min(other.depth);
        self.levels[..n] == other.levels[..n]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_extends_chain() {
        let root = Cookie::root();
        let frame = root.child(1);
        let batch = frame.child(7);
        assert_eq!(batch.levels(), &[1, 7]);
    }

    #[test]
    fn siblings_share_prefix() {
        let root = Cookie::root();
        let triangle = root.child(3).child(9);
        let frag_a = triangle.child(100);
        let frag_b = triangle.child(101);
        assert!(frag_a.shares_prefix(&frag_b, 2));
        assert_ne!(frag_a, frag_b);
    }

    #[test]
    #[should_panic(expected = "exceeded")]
    fn overflow_panics() {
        let mut c = Cookie::root();
        for i in 0..=MAX_COOKIE_LEVELS {
            c = c.child(i as u64);
        }
    }
}
