/*
 *
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use crate::hash::murmur3::murmur3_32;
use epserde::prelude::*;
use mem_dbg::{MemDbg, MemSize};
use std::collections::BTreeSet;

/// The number of placement hash functions.
///
/// Each key is mapped to [`HASH_COUNT`] cells, one per stripe of the table,
/// using MurmurHash3 with seeds `0..HASH_COUNT`.
pub const HASH_COUNT: usize = 4;

/// The seed of the hash validating pure cells.
///
/// It is reserved: placement seeds will never reach it.
pub const CHECK_SEED: u32 = 11;

/// Errors arising from operations on tables.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("value is {got} bytes, but the table stores {expected}-byte values")]
    /// An [insertion](Iblt::insert) or [erasure](Iblt::erase) passed a value
    /// whose length differs from the [value size](Iblt::value_size) fixed at
    /// construction.
    ValueSizeMismatch { expected: usize, got: usize },
    #[error("incompatible shapes: {cells} cells / {value_size}-byte values vs. {other_cells} cells / {other_value_size}-byte values")]
    /// A [subtraction](Iblt::subtract) was attempted between tables of
    /// different shapes.
    ShapeMismatch {
        cells: usize,
        value_size: usize,
        other_cells: usize,
        other_value_size: usize,
    },
}

/// The outcome of a [point lookup](Iblt::get).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The key is in the table, associated with the given value.
    Found(Vec<u8>),
    /// The key is certainly not in the table.
    Absent,
    /// The table is too loaded to decide.
    Undecidable,
}

/// The outcome of a [full decode](Iblt::list_entries).
///
/// Pairs are split by the sign of their net multiplicity. Both sets are
/// correct even when `complete` is false: an overloaded table yields a
/// partial, but never a wrong, listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entries {
    /// Pairs that were inserted (net multiplicity +1).
    pub positive: BTreeSet<(u64, Vec<u8>)>,
    /// Pairs that were erased without ever having been inserted (net
    /// multiplicity −1), as produced by [subtraction](Iblt::subtract).
    pub negative: BTreeSet<(u64, Vec<u8>)>,
    /// Whether every cell of the table was decoded.
    pub complete: bool,
}

/// A cell of the table, accumulating all pairs placed on it under XOR.
#[derive(Epserde, Debug, Clone, Default, MemDbg, MemSize, PartialEq, Eq)]
struct Cell {
    /// Insertions minus erasures that were placed on this cell.
    count: i32,
    /// XOR of the keys placed on this cell.
    key_sum: u64,
    /// XOR of the check hashes of the keys placed on this cell.
    key_check: u32,
    /// Byte-wise XOR of the values placed on this cell; either empty or
    /// exactly as long as the value size of the table.
    value_sum: Vec<u8>,
}

impl Cell {
    /// Whether no pair is placed on this cell.
    ///
    /// Updates keep the representation canonical, clearing `value_sum` when
    /// the scalar fields return to zero, so testing them suffices.
    #[inline(always)]
    fn is_empty(&self) -> bool {
        self.count == 0 && self.key_sum == 0 && self.key_check == 0
    }

    /// Whether this cell holds exactly one pair, up to a ≈2⁻³² chance of a
    /// check-hash collision.
    #[inline(always)]
    fn is_pure(&self) -> bool {
        (self.count == 1 || self.count == -1)
            && self.key_check == murmur3_32(CHECK_SEED, self.key_sum.to_le_bytes())
    }
}

/// An invertible Bloom lookup table: a sketch of a multiset of `u64` keys
/// associated with fixed-size byte values.
///
/// Unlike a Bloom filter, the table can return the keys and values stored in
/// it: as long as the load stays within the number of entries expected at
/// construction, [`get`](Iblt::get) recovers single pairs and
/// [`list_entries`](Iblt::list_entries) recovers all of them with high
/// probability. Moreover, tables of the same shape can be
/// [subtracted](Iblt::subtract), and listing the difference enumerates the
/// symmetric difference of the underlying multisets, which makes it possible
/// for two peers to reconcile their sets by exchanging tables whose size
/// depends only on the size of the difference, not of the sets.
///
/// Erasing a pair that was never inserted is allowed, and yields an entry
/// with negative multiplicity; this is what subtraction produces for pairs
/// present only in the subtrahend. Queries never mutate the table: decoding
/// peels a private clone.
///
/// Overload is not an error: [`get`](Iblt::get) returns
/// [`Lookup::Undecidable`] and [`list_entries`](Iblt::list_entries) returns a
/// partial listing with `complete` set to false, and the caller may retry
/// with a larger table.
///
/// # References
///
/// - Michael T. Goodrich and Michael Mitzenmacher, “[Invertible Bloom lookup
///   tables](https://arxiv.org/abs/1101.2245)”, *49th Annual Allerton
///   Conference on Communication, Control, and Computing*, 2011.
/// - David Eppstein, Michael T. Goodrich, Frank Uyeda, and George Varghese,
///   “[What's the difference? Efficient set reconciliation without prior
///   context](https://dl.acm.org/doi/10.1145/2018436.2018462)”, *SIGCOMM
///   2011*.
///
/// # Examples
///
/// ```rust
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use iblt::prelude::*;
///
/// let mut table = Iblt::new(20, 4);
/// table.insert(1, [0x11, 0x11, 0x11, 0x11])?;
/// table.insert(2, [0x22, 0x22, 0x22, 0x22])?;
///
/// assert_eq!(table.get(1), Lookup::Found(vec![0x11, 0x11, 0x11, 0x11]));
/// assert_eq!(table.get(3), Lookup::Absent);
///
/// let mut other = Iblt::new(20, 4);
/// other.insert(2, [0x22, 0x22, 0x22, 0x22])?;
/// other.insert(3, [0x33, 0x33, 0x33, 0x33])?;
///
/// // Pairs only in `table` come out positive, pairs only in `other` negative.
/// let entries = table.subtract(&other)?.list_entries();
/// assert!(entries.complete);
/// assert!(entries.positive.contains(&(1, vec![0x11, 0x11, 0x11, 0x11])));
/// assert!(entries.negative.contains(&(3, vec![0x33, 0x33, 0x33, 0x33])));
/// # Ok(())
/// # }
/// ```
#[derive(Epserde, Debug, Clone, MemDbg, MemSize, PartialEq, Eq)]
pub struct Iblt {
    /// The cells, partitioned into [`HASH_COUNT`] stripes of equal length;
    /// the *i*-th placement hash maps keys into the *i*-th stripe only.
    cells: Vec<Cell>,
    /// The length of every stored value.
    value_size: usize,
}

impl Iblt {
    /// Creates an empty table sized for `expected_entries` entries of
    /// `value_size` bytes each.
    ///
    /// The table allocates 1.5 cells per expected entry, rounded up to a
    /// positive multiple of [`HASH_COUNT`], which makes decoding at design
    /// load fail with very low probability.
    pub fn new(expected_entries: usize, value_size: usize) -> Self {
        let cells = expected_entries + expected_entries / 2;
        let cells = cells.max(1).div_ceil(HASH_COUNT) * HASH_COUNT;
        Self {
            cells: vec![Cell::default(); cells],
            value_size,
        }
    }

    /// Returns the number of cells of the table.
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Returns the length of the values stored in the table.
    pub fn value_size(&self) -> usize {
        self.value_size
    }

    /// Returns whether the table contains no entries.
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Cell::is_empty)
    }

    /// Inserts a pair, increasing its multiplicity by one.
    ///
    /// The value must be exactly [`value_size`](Iblt::value_size) bytes long.
    pub fn insert(&mut self, key: u64, value: impl AsRef<[u8]>) -> Result<(), Error> {
        let value = value.as_ref();
        if value.len() != self.value_size {
            return Err(Error::ValueSizeMismatch {
                expected: self.value_size,
                got: value.len(),
            });
        }
        self.apply(1, key, value);
        Ok(())
    }

    /// Erases a pair, decreasing its multiplicity by one.
    ///
    /// The pair need not have been inserted: erasures and insertions are
    /// inverse group operations, and a never-inserted pair simply ends up
    /// with multiplicity −1.
    pub fn erase(&mut self, key: u64, value: impl AsRef<[u8]>) -> Result<(), Error> {
        let value = value.as_ref();
        if value.len() != self.value_size {
            return Err(Error::ValueSizeMismatch {
                expected: self.value_size,
                got: value.len(),
            });
        }
        self.apply(-1, key, value);
        Ok(())
    }

    /// Looks up the value associated with a key.
    ///
    /// The three possible outcomes are “present with this value”, “certainly
    /// absent”, and “the table is too loaded to tell”; the last one is a
    /// legitimate result, not an error, and the caller may retry with a
    /// larger table.
    ///
    /// If the cells of the key are inconclusive, a private clone of the table
    /// is peeled: decodable cells are stripped one by one, re-examining the
    /// key's cells after every productive sweep, until the key is decided or
    /// no cell can be stripped.
    pub fn get(&self, key: u64) -> Lookup {
        if let Some(lookup) = self.probe(key) {
            return lookup;
        }

        let mut peeled = self.clone();
        loop {
            let mut stripped = 0;
            for index in 0..peeled.cells.len() {
                let cell = &peeled.cells[index];
                if !cell.is_pure() {
                    continue;
                }
                if cell.key_sum == key {
                    return Lookup::Found(cell.value_sum.clone());
                }
                let (count, key_sum, value_sum) =
                    (cell.count, cell.key_sum, cell.value_sum.clone());
                peeled.apply(-count, key_sum, &value_sum);
                stripped += 1;
            }
            if stripped == 0 {
                return Lookup::Undecidable;
            }
            if let Some(lookup) = peeled.probe(key) {
                return lookup;
            }
        }
    }

    /// Decodes all entries of the table.
    ///
    /// Every pure cell identifies one pair; stripping the pair may turn
    /// cells of its other stripes pure, continuing the cascade. The sweep is
    /// repeated until no cell can be stripped; `complete` reports whether the
    /// whole table was decoded.
    pub fn list_entries(&self) -> Entries {
        let mut peeled = self.clone();
        let mut entries = Entries::default();

        loop {
            let mut stripped = 0;
            for index in 0..peeled.cells.len() {
                let cell = &peeled.cells[index];
                if !cell.is_pure() {
                    continue;
                }
                let (count, key_sum, value_sum) =
                    (cell.count, cell.key_sum, cell.value_sum.clone());
                if count == 1 {
                    entries.positive.insert((key_sum, value_sum.clone()));
                } else {
                    entries.negative.insert((key_sum, value_sum.clone()));
                }
                peeled.apply(-count, key_sum, &value_sum);
                stripped += 1;
            }
            if stripped == 0 {
                break;
            }
        }

        entries.complete = peeled.cells.iter().all(Cell::is_empty);
        entries
    }

    /// Subtracts another table of the same shape, cell by cell.
    ///
    /// If this table sketches multiset *A* and `other` sketches *B*, the
    /// result sketches the signed multiset *A* − *B*:
    /// [listing](Iblt::list_entries) it returns the pairs only in *A* as
    /// positive and the pairs only in *B* as negative, provided the symmetric
    /// difference fits the capacity of the table.
    ///
    /// Values are expected to be determined by their keys across the two
    /// tables: since placement depends only on the key, a key present on
    /// both sides with different values cancels out of the difference
    /// instead of being enumerated on both sides.
    pub fn subtract(&self, other: &Self) -> Result<Self, Error> {
        if self.cells.len() != other.cells.len() || self.value_size != other.value_size {
            return Err(Error::ShapeMismatch {
                cells: self.cells.len(),
                value_size: self.value_size,
                other_cells: other.cells.len(),
                other_value_size: other.value_size,
            });
        }

        let mut result = self.clone();
        for (cell, other_cell) in result.cells.iter_mut().zip(&other.cells) {
            cell.count -= other_cell.count;
            cell.key_sum ^= other_cell.key_sum;
            cell.key_check ^= other_cell.key_check;
            if !other_cell.value_sum.is_empty() {
                if cell.value_sum.is_empty() {
                    cell.value_sum.resize(self.value_size, 0);
                }
                for (sum, byte) in cell.value_sum.iter_mut().zip(&other_cell.value_sum) {
                    *sum ^= byte;
                }
            }
            if cell.is_empty() {
                cell.value_sum.clear();
            }
        }
        Ok(result)
    }

    /// Returns a human-readable listing of the cells: index, count, key sum,
    /// and whether the key check validates the key sum.
    ///
    /// The format is meant for diagnostics and is not stable.
    pub fn dump_table(&self) -> String {
        let mut result = String::from("cell count key_sum check\n");
        for (index, cell) in self.cells.iter().enumerate() {
            let check =
                cell.key_check == murmur3_32(CHECK_SEED, cell.key_sum.to_le_bytes());
            result.push_str(&format!(
                "{} {} {:x} {}\n",
                index,
                cell.count,
                cell.key_sum,
                if check { "ok" } else { "bad" },
            ));
        }
        result
    }

    /// Returns the indices of the cells of `key`, one per stripe.
    #[inline]
    fn placements(&self, key: u64) -> [usize; HASH_COUNT] {
        let key_bytes = key.to_le_bytes();
        let stripe_len = self.cells.len() / HASH_COUNT;
        std::array::from_fn(|i| {
            i * stripe_len + murmur3_32(i as u32, key_bytes) as usize % stripe_len
        })
    }

    /// Adds `delta` copies of a pair to the cells of its key.
    ///
    /// This is the group update underlying both insertion (`delta` = 1) and
    /// erasure (`delta` = −1): applying it twice with opposite deltas leaves
    /// the table bit-identical. The caller must have checked the value
    /// length.
    fn apply(&mut self, delta: i32, key: u64, value: &[u8]) {
        debug_assert_eq!(value.len(), self.value_size);
        let key_check = murmur3_32(CHECK_SEED, key.to_le_bytes());
        let value_size = self.value_size;
        for index in self.placements(key) {
            let cell = &mut self.cells[index];
            cell.count += delta;
            cell.key_sum ^= key;
            cell.key_check ^= key_check;
            if cell.value_sum.is_empty() {
                cell.value_sum.resize(value_size, 0);
            }
            for (sum, byte) in cell.value_sum.iter_mut().zip(value) {
                *sum ^= byte;
            }
            // Keep the empty representation canonical: an emptied cell must
            // not retain a zeroed value buffer.
            if cell.is_empty() {
                cell.value_sum.clear();
            }
        }
    }

    /// Inspects the cells of `key`, returning `None` if all of them are
    /// inconclusive.
    ///
    /// An empty cell proves the key absent; a pure cell either carries the
    /// key, proving it present, or carries a different single key, proving
    /// it absent (the key would otherwise have contributed to the cell).
    fn probe(&self, key: u64) -> Option<Lookup> {
        for index in self.placements(key) {
            let cell = &self.cells[index];
            if cell.is_empty() {
                return Some(Lookup::Absent);
            }
            if cell.is_pure() {
                return Some(if cell.key_sum == key {
                    Lookup::Found(cell.value_sum.clone())
                } else {
                    Lookup::Absent
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_min_table() {
        // No expected entries still allocates one cell per stripe.
        let table = Iblt::new(0, 1);
        assert_eq!(table.num_cells(), HASH_COUNT);
        assert!(table.is_empty());
    }

    #[test]
    fn test_cell_rounding() {
        // 1.5× the expected entries, rounded up to a multiple of the number
        // of stripes.
        assert_eq!(Iblt::new(20, 4).num_cells(), 32);
        assert_eq!(Iblt::new(8, 4).num_cells(), 12);
        assert_eq!(Iblt::new(1, 4).num_cells(), 4);
    }

    #[test]
    fn test_value_size_mismatch() {
        let mut table = Iblt::new(10, 4);
        assert!(matches!(
            table.insert(0, [0; 3]),
            Err(Error::ValueSizeMismatch {
                expected: 4,
                got: 3
            })
        ));
        assert!(matches!(
            table.erase(0, [0; 5]),
            Err(Error::ValueSizeMismatch {
                expected: 4,
                got: 5
            })
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn test_shape_mismatch() {
        let table = Iblt::new(10, 4);
        assert!(matches!(
            table.subtract(&Iblt::new(100, 4)),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(matches!(
            table.subtract(&Iblt::new(10, 8)),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_zero_value_size() {
        let mut table = Iblt::new(10, 0);
        table.insert(5, []).unwrap();
        assert_eq!(table.get(5), Lookup::Found(vec![]));
        let entries = table.list_entries();
        assert!(entries.complete);
        assert!(entries.positive.contains(&(5, vec![])));
    }

    #[test]
    fn test_dump_table() {
        let mut table = Iblt::new(0, 1);
        table.insert(3, [0xab]).unwrap();
        let dump = table.dump_table();
        assert_eq!(dump.lines().count(), table.num_cells() + 1);
        // A single entry leaves every touched cell pure.
        assert!(!dump.contains("bad"));
    }
}
