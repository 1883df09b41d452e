//! Tree order derivation from a page-size budget.

use grove_common::{GroveError, Result};

/// Serialized node overhead: kind tag (1) + entry count (2) + next link (4).
pub(crate) const NODE_HEADER_SIZE: usize = 7;

/// Serialized size of one child position.
pub(crate) const CHILD_PTR_SIZE: usize = 4;

/// Node capacity limits derived from a page-size budget.
///
/// The order (maximum fanout) is the largest odd number whose serialized
/// node (header, `order - 1` entries, `order` child positions) fits the
/// budget. An odd order keeps capacity symmetric around the split midpoint.
/// Every non-root node holds between `min_entries` and `max_entries`
/// entries; only the root may hold fewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeOrder {
    /// Maximum number of children of an internal node.
    pub order: usize,
    /// Maximum entries per node (`order - 1`).
    pub max_entries: usize,
    /// Minimum entries per non-root node (`ceil(order / 2) - 1`).
    pub min_entries: usize,
    /// Serialized size of one (key, value) entry.
    entry_size: usize,
}

impl NodeOrder {
    /// Derives the order for the given budget and entry component sizes.
    ///
    /// Fails if the budget cannot fit a node of order 3, the smallest
    /// splittable capacity, or if it would allow more entries than the
    /// record's `u16` count field can hold.
    pub fn for_page_budget(
        page_budget: usize,
        key_size: usize,
        value_size: usize,
    ) -> Result<Self> {
        let entry_size = key_size + value_size;
        let stride = entry_size + CHILD_PTR_SIZE;

        // record size = header + (order - 1) * entry + order * ptr
        //             = header - entry + order * stride
        let mut order = (page_budget + entry_size)
            .saturating_sub(NODE_HEADER_SIZE)
            / stride;
        if order % 2 == 0 {
            order = order.saturating_sub(1);
        }
        if order < 3 {
            return Err(GroveError::ConfigError(format!(
                "page budget {page_budget} too small for entries of {entry_size} bytes"
            )));
        }
        if order - 1 > u16::MAX as usize {
            return Err(GroveError::ConfigError(format!(
                "page budget {page_budget} allows {} entries per node, more than the \
                 record count field can hold",
                order - 1
            )));
        }

        Ok(Self {
            order,
            max_entries: order - 1,
            min_entries: (order + 1) / 2 - 1,
            entry_size,
        })
    }

    /// Serialized size of one node record.
    pub fn record_size(&self) -> usize {
        NODE_HEADER_SIZE + self.max_entries * self.entry_size + self.order * CHILD_PTR_SIZE
    }
}
