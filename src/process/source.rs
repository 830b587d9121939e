// src/process/source.rs

//! Event sources of the run loop and a small set type over them.
//!
//! A [`Source`] is used three ways: as a member of an interest/readiness
//! [`SourceSet`], as the tag handed to [`RunHandler::handle`], and as the
//! token stored in the multiplexer registration.
//!
//! [`RunHandler::handle`]: crate::process::RunHandler::handle

use std::fmt;

/// Something the run loop can wait on, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Source {
    /// Caller-supplied auxiliary descriptor, watched for writability.
    Monitor,
    /// Parent side of the child's stdin, watched for writability.
    Stdin,
    Stdout,
    Stderr,
    /// The supervision deadline elapsed.
    Timeout,
    /// The child changed state (exited).
    Exit,
}

impl Source {
    pub const ALL: [Source; 6] = [
        Source::Monitor,
        Source::Stdin,
        Source::Stdout,
        Source::Stderr,
        Source::Timeout,
        Source::Exit,
    ];

    /// Sources backed by a real descriptor.
    pub const IO: [Source; 4] = [
        Source::Monitor,
        Source::Stdin,
        Source::Stdout,
        Source::Stderr,
    ];

    /// Timer- or notifier-backed sources, which carry no descriptor.
    pub fn is_synthetic(self) -> bool {
        matches!(self, Source::Timeout | Source::Exit)
    }

    /// Whether the parent writes to this source (as opposed to reading).
    pub fn is_output(self) -> bool {
        matches!(self, Source::Monitor | Source::Stdin)
    }

    pub fn name(self) -> &'static str {
        match self {
            Source::Monitor => "monitor",
            Source::Stdin => "stdin",
            Source::Stdout => "stdout",
            Source::Stderr => "stderr",
            Source::Timeout => "timeout",
            Source::Exit => "exit",
        }
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    /// Registration token stored alongside a descriptor in the multiplexer.
    pub(crate) fn token(self) -> u64 {
        self as u64
    }

    pub(crate) fn from_token(token: u64) -> Option<Source> {
        Source::ALL.get(usize::try_from(token).ok()?).copied()
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed-size set of [`Source`]s.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SourceSet(u8);

impl SourceSet {
    pub const fn empty() -> Self {
        SourceSet(0)
    }

    pub fn all() -> Self {
        Source::ALL.into_iter().collect()
    }

    /// Every descriptor-backed source.
    pub fn io() -> Self {
        Source::IO.into_iter().collect()
    }

    /// Add `source`; returns `true` if it was not present.
    pub fn insert(&mut self, source: Source) -> bool {
        let absent = !self.contains(source);
        self.0 |= source.bit();
        absent
    }

    /// Remove `source`; returns `true` if it was present.
    pub fn remove(&mut self, source: Source) -> bool {
        let present = self.contains(source);
        self.0 &= !source.bit();
        present
    }

    pub fn contains(self, source: Source) -> bool {
        self.0 & source.bit() != 0
    }

    pub fn with(mut self, source: Source) -> Self {
        self.insert(source);
        self
    }

    pub fn without(mut self, source: Source) -> Self {
        self.remove(source);
        self
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn union(self, other: SourceSet) -> Self {
        SourceSet(self.0 | other.0)
    }

    pub fn intersection(self, other: SourceSet) -> Self {
        SourceSet(self.0 & other.0)
    }

    pub fn difference(self, other: SourceSet) -> Self {
        SourceSet(self.0 & !other.0)
    }

    /// Sources present in exactly one of the two sets.
    pub fn changed(self, other: SourceSet) -> Self {
        SourceSet(self.0 ^ other.0)
    }

    /// Members in dispatch order.
    pub fn iter(self) -> impl Iterator<Item = Source> {
        Source::ALL.into_iter().filter(move |s| self.contains(*s))
    }
}

impl FromIterator<Source> for SourceSet {
    fn from_iter<I: IntoIterator<Item = Source>>(iter: I) -> Self {
        let mut set = SourceSet::empty();
        set.extend(iter);
        set
    }
}

impl Extend<Source> for SourceSet {
    fn extend<I: IntoIterator<Item = Source>>(&mut self, iter: I) {
        for source in iter {
            self.insert(source);
        }
    }
}

impl fmt::Debug for SourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
