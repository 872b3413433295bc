//! Read planning for one poll cycle
//!
//! A selection may contain a word tag (`N7:0`) together with any number of
//! its bit tags (`N7:0/0` .. `N7:0/15`), or the same symbolic tag twice under
//! different display names. The planner groups tags by the underlying device
//! address so each address is read exactly once per cycle, and fans the raw
//! value out to every tag that references it.
//!
//! # Example
//!
//! ```ignore
//! use plctrend_rs::backend::read_plan::ReadPlan;
//!
//! let plan = ReadPlan::new(&tags);
//! let results = device.read_batch(&plan.addresses());
//! for (read, result) in plan.reads.iter().zip(results) {
//!     for &idx in &read.tag_indices {
//!         let value = result.as_ref().map(|r| extract_value(&tags[idx], r.value));
//!     }
//! }
//! ```

use super::device::ReadAddress;
use crate::types::{Tag, TagAddress};
use std::collections::HashMap;

/// A planned device read and the tags served by it
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRead {
    /// The address to read
    pub address: ReadAddress,
    /// Tag indices (from the planned slice) that take their value from this read
    pub tag_indices: Vec<usize>,
}

/// Deduplicated reads for a tag selection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadPlan {
    /// Reads in first-referenced order
    pub reads: Vec<PlannedRead>,
    tag_count: usize,
}

impl ReadPlan {
    /// Plan the reads for a selection
    pub fn new(tags: &[Tag]) -> Self {
        let mut reads: Vec<PlannedRead> = Vec::new();
        let mut by_address: HashMap<ReadAddress, usize> = HashMap::with_capacity(tags.len());

        for (idx, tag) in tags.iter().enumerate() {
            let address = read_address(&tag.address);
            match by_address.get(&address) {
                Some(&slot) => reads[slot].tag_indices.push(idx),
                None => {
                    by_address.insert(address.clone(), reads.len());
                    reads.push(PlannedRead {
                        address,
                        tag_indices: vec![idx],
                    });
                }
            }
        }

        Self {
            reads,
            tag_count: tags.len(),
        }
    }

    /// Addresses to read, in plan order
    pub fn addresses(&self) -> Vec<ReadAddress> {
        self.reads.iter().map(|r| r.address.clone()).collect()
    }

    /// Number of device reads the plan issues
    pub fn read_count(&self) -> usize {
        self.reads.len()
    }

    /// Number of individual reads saved by sharing
    pub fn reads_saved(&self) -> usize {
        self.tag_count.saturating_sub(self.reads.len())
    }

    /// Whether the plan reads nothing
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }
}

/// Device address that serves a tag
///
/// Bit tags are served by their word.
pub fn read_address(address: &TagAddress) -> ReadAddress {
    match address {
        TagAddress::Named(name) => ReadAddress::Named(name.clone()),
        TagAddress::FileElement(addr) => ReadAddress::Element(*addr),
        TagAddress::FileBit { word, .. } => ReadAddress::Element(*word),
    }
}

/// Value of a tag given the raw value of the read that serves it
pub fn extract_value(address: &TagAddress, raw: f64) -> f64 {
    match address {
        TagAddress::FileBit { bit, .. } => {
            let word = raw as i64;
            word.checked_shr(u32::from(*bit)).map_or(0.0, |w| (w & 1) as f64)
        }
        _ => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::address::{FileAddress, FileType};
    use crate::types::TagDataType;

    fn n7(element: u16) -> FileAddress {
        FileAddress::new(FileType::Integer, 7, element)
    }

    #[test]
    fn test_empty_selection() {
        let plan = ReadPlan::new(&[]);
        assert!(plan.is_empty());
        assert_eq!(plan.reads_saved(), 0);
    }

    #[test]
    fn test_word_and_bits_share_one_read() {
        let tags = vec![
            Tag::element(n7(0), TagDataType::Integer),
            Tag::bit(n7(0), 0),
            Tag::bit(n7(0), 3),
            Tag::element(n7(1), TagDataType::Integer),
        ];
        let plan = ReadPlan::new(&tags);

        assert_eq!(plan.read_count(), 2);
        assert_eq!(plan.reads_saved(), 2);
        assert_eq!(plan.reads[0].address, ReadAddress::Element(n7(0)));
        assert_eq!(plan.reads[0].tag_indices, vec![0, 1, 2]);
        assert_eq!(plan.reads[1].tag_indices, vec![3]);
    }

    #[test]
    fn test_bits_without_word() {
        let tags = vec![Tag::bit(n7(2), 15), Tag::bit(n7(2), 1)];
        let plan = ReadPlan::new(&tags);
        assert_eq!(plan.addresses(), vec![ReadAddress::Element(n7(2))]);
    }

    #[test]
    fn test_extract_bits() {
        let word = n7(0);
        let raw = 0b1010 as f64;
        assert_eq!(extract_value(&TagAddress::FileBit { word, bit: 0 }, raw), 0.0);
        assert_eq!(extract_value(&TagAddress::FileBit { word, bit: 1 }, raw), 1.0);
        assert_eq!(extract_value(&TagAddress::FileBit { word, bit: 3 }, raw), 1.0);
        assert_eq!(extract_value(&TagAddress::FileElement(word), raw), 10.0);
    }

    #[test]
    fn test_extract_sign_bit() {
        let word = n7(0);
        // -1 as a 16-bit word has every bit set
        assert_eq!(extract_value(&TagAddress::FileBit { word, bit: 15 }, -1.0), 1.0);
        assert_eq!(
            extract_value(&TagAddress::FileBit { word, bit: 15 }, -32768.0),
            1.0
        );
    }

    #[test]
    fn test_extract_bit_past_word_width() {
        let word = n7(0);
        assert_eq!(extract_value(&TagAddress::FileBit { word, bit: 63 }, -1.0), 1.0);
        assert_eq!(extract_value(&TagAddress::FileBit { word, bit: 64 }, -1.0), 0.0);
        assert_eq!(extract_value(&TagAddress::FileBit { word, bit: 255 }, 7.0), 0.0);
    }

    // Property-based tests using proptest
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_every_tag_served_exactly_once(
            picks in prop::collection::vec((0u16..8, prop::option::of(0u8..16)), 1..60)
        ) {
            let tags: Vec<Tag> = picks
                .iter()
                .map(|&(element, bit)| match bit {
                    Some(bit) => Tag::bit(n7(element), bit),
                    None => Tag::element(n7(element), TagDataType::Integer),
                })
                .collect();
            let plan = ReadPlan::new(&tags);

            for i in 0..tags.len() {
                let count = plan.reads.iter()
                    .filter(|r| r.tag_indices.contains(&i))
                    .count();
                prop_assert_eq!(count, 1, "Tag {} should be served by exactly one read", i);
            }
        }

        #[test]
        fn test_addresses_are_unique(
            elements in prop::collection::vec(0u16..16, 1..40)
        ) {
            let tags: Vec<Tag> = elements
                .iter()
                .map(|&e| Tag::bit(n7(e), (e % 16) as u8))
                .collect();
            let plan = ReadPlan::new(&tags);
            let addresses = plan.addresses();
            let unique: std::collections::HashSet<_> = addresses.iter().collect();
            prop_assert_eq!(unique.len(), addresses.len());
        }

        #[test]
        fn test_extract_bit_is_binary(raw in -32768i64..32768, bit in 0u8..16) {
            let value = extract_value(&TagAddress::FileBit { word: n7(0), bit }, raw as f64);
            prop_assert!(value == 0.0 || value == 1.0);
        }
    }
}
