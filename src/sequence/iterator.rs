use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use crate::handle::Handle;

use super::manager::EntitySequence;

/// A restartable finite sequence of `(sequence, offset, count)` triples.
/// Given a sorted input handle range, yields exactly the contiguous runs
/// that overlap live `EntitySequence`s, in handle order — the fast path for
/// bulk tag get/set described in the design notes.
pub struct RangeIntersectionIter<'a> {
    sequences: &'a BTreeMap<Handle, EntitySequence>,
    remaining: RangeInclusive<Handle>,
    done: bool,
}

/// One overlapping run: the owning sequence, the offset of the run's first
/// entity within that sequence, and the run's length.
pub struct Run<'a> {
    pub sequence: &'a EntitySequence,
    pub offset: u64,
    pub count: u64,
}

impl<'a> RangeIntersectionIter<'a> {
    pub fn new(sequences: &'a BTreeMap<Handle, EntitySequence>, range: RangeInclusive<Handle>) -> Self {
        Self { sequences, remaining: range, done: false }
    }
}

impl<'a> Iterator for RangeIntersectionIter<'a> {
    type Item = Run<'a>;

    fn next(&mut self) -> Option<Run<'a>> {
        loop {
            if self.done || self.remaining.start() > self.remaining.end() {
                return None;
            }
            let cursor = *self.remaining.start();
            let candidate = self
                .sequences
                .range(..=cursor)
                .next_back()
                .map(|(_, s)| s)
                .filter(|s| s.contains(cursor));
            if let Some(seq) = candidate {
                let run_end = (*self.remaining.end()).min(seq.end);
                let offset = cursor - seq.start;
                let count = run_end - cursor + 1;
                if run_end == *self.remaining.end() {
                    self.done = true;
                } else {
                    self.remaining = (run_end + 1)..=*self.remaining.end();
                }
                return Some(Run { sequence: seq, offset, count });
            }
            // No sequence owns `cursor`: skip forward to the next sequence
            // start at or after cursor, if any is still within range.
            match self.sequences.range(cursor..).next() {
                Some((&next_start, _)) if next_start <= *self.remaining.end() => {
                    self.remaining = next_start..=*self.remaining.end();
                }
                _ => return None,
            }
        }
    }
}
