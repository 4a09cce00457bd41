use tracing::trace;

use super::{ByteIndex, StorageProvider};
use crate::Signature;

/// A signature's concrete bytes ordered by how often they occur in an index.
///
/// Ties keep signature order, so the same index and signature always yield the same
/// plan. Only the first two entries are intersected through the index; the rest are
/// compared against the buffer directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    order: Vec<(usize, u8)>,
}

impl QueryPlan {
    pub(crate) fn new<P: StorageProvider>(index: &ByteIndex<'_, P>, sig: &Signature) -> Self {
        let mut order = sig.concrete().to_vec();
        order.sort_by_key(|&(_, value)| index.count(value));

        trace!(signature = %sig, rarest = ?order.get(..2), "planned query");

        Self { order }
    }

    /// All `(position, value)` pairs, rarest value first
    pub fn entries(&self) -> &[(usize, u8)] {
        &self.order
    }

    /// The two rarest entries, if the plan has at least two
    pub fn rarest(&self) -> Option<[(usize, u8); 2]> {
        match self.order[..] {
            [first, second, ..] => Some([first, second]),
            _ => None,
        }
    }

    /// Entries checked against the buffer after the intersection
    pub fn remaining(&self) -> &[(usize, u8)] {
        self.order.get(2..).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use crate::{ByteIndex, Signature};

    #[test]
    fn orders_rarest_first() {
        // 0x90 common, 0xCC rare, 0xE8 once
        let mut buf = vec![0x90u8; 200];
        buf[10] = 0xCC;
        buf[20] = 0xCC;
        buf[30] = 0xE8;

        let index = ByteIndex::new(&buf).unwrap();
        let sig = Signature::parse("90 CC ?? E8").unwrap();
        let plan = index.plan(&sig);

        assert_eq!(plan.entries(), &[(3, 0xE8), (1, 0xCC), (0, 0x90)]);
        assert_eq!(plan.rarest(), Some([(3, 0xE8), (1, 0xCC)]));
        assert_eq!(plan.remaining(), &[(0, 0x90)]);
    }

    #[test]
    fn ties_keep_signature_order() {
        let index = ByteIndex::new(b"abcd").unwrap();
        let sig = Signature::parse("64 63 62 61").unwrap();

        assert_eq!(
            index.plan(&sig).entries(),
            &[(0, b'd'), (1, b'c'), (2, b'b'), (3, b'a')]
        );
    }

    #[test]
    fn absent_values_sort_before_present_ones() {
        let index = ByteIndex::new(b"aaaa").unwrap();
        let sig = Signature::parse("61 ?? 7A").unwrap();

        assert_eq!(index.plan(&sig).rarest(), Some([(2, b'z'), (0, b'a')]));
        assert!(index.plan(&sig).remaining().is_empty());
    }
}
