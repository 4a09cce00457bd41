use std::{cmp::Ordering, fmt, iter::FusedIterator};

use super::{ByteIndex, Offsets, QueryPlan, StorageProvider};

/// One of the two intersected offset streams.
///
/// Keys are shifted by the *other* entry's position, so equal keys on both sides
/// imply the same signature start without ever going negative.
#[derive(Debug, Clone)]
struct Stream<'i> {
    offsets: Offsets<'i>,
    shift: u64,
    key: Option<u64>,
}

impl<'i> Stream<'i> {
    fn new(mut offsets: Offsets<'i>, shift: usize) -> Self {
        let shift = shift as u64;
        let key = offsets.next().map(|offset| offset as u64 + shift);

        Self {
            offsets,
            shift,
            key,
        }
    }

    fn advance(&mut self) {
        self.key = self.offsets.next().map(|offset| offset as u64 + self.shift);
    }
}

/// Iterator over confirmed match offsets, in ascending order.
///
/// Created by [`ByteIndex::matches`].
#[derive(Clone)]
pub struct Matches<'i> {
    buf: &'i [u8],
    len: usize,
    plan: QueryPlan,
    // sum of the two rarest positions
    span: u64,
    streams: Option<(Stream<'i>, Stream<'i>)>,
}

impl<'i> Matches<'i> {
    pub(crate) fn new<P: StorageProvider>(
        index: &'i ByteIndex<'_, P>,
        plan: QueryPlan,
        len: usize,
    ) -> Self {
        let streams = match plan.rarest() {
            Some([(pos1, value1), (pos2, value2)])
                if index.count(value1) > 0 && index.count(value2) > 0 =>
            {
                let lhs = Stream::new(index.offsets(value1), pos2);
                let rhs = Stream::new(index.offsets(value2), pos1);

                Some((lhs, rhs))
            }

            _ => None,
        };

        let span = plan
            .rarest()
            .map_or(0, |[(pos1, _), (pos2, _)]| (pos1 + pos2) as u64);

        Self {
            buf: index.buffer(),
            len,
            plan,
            span,
            streams,
        }
    }

    /// Full check of a structural candidate whose streams met at `key`
    fn confirm(&self, key: u64) -> Option<usize> {
        let start = usize::try_from(key.checked_sub(self.span)?).ok()?;

        let end = start.checked_add(self.len)?;
        if end > self.buf.len() {
            return None;
        }

        self.plan
            .remaining()
            .iter()
            .all(|&(pos, value)| self.buf[start + pos] == value)
            .then_some(start)
    }
}

impl Iterator for Matches<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (lhs, rhs) = self.streams.as_mut()?;
            let (Some(a), Some(b)) = (lhs.key, rhs.key) else {
                self.streams = None;
                return None;
            };

            match a.cmp(&b) {
                Ordering::Less => lhs.advance(),
                Ordering::Greater => rhs.advance(),
                Ordering::Equal => {
                    lhs.advance();
                    rhs.advance();

                    if let Some(start) = self.confirm(a) {
                        return Some(start);
                    }
                }
            }
        }
    }
}

impl FusedIterator for Matches<'_> {}

impl fmt::Debug for Matches<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matches")
            .field("len", &self.len)
            .field("plan", &self.plan)
            .field("done", &self.streams.is_none())
            .finish()
    }
}
