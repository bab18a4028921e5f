use std::fmt::{self, Debug, Formatter};

type BitBlock = u64;

const BLOCK_NBITS: usize = std::mem::size_of::<BitBlock>() * 8;

/// Fixed-capacity set of terminal ids, used for FIRST sets and lookaheads.
#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) struct BitSet {
  slice: Box<[BitBlock]>,
}

impl BitSet {
  pub(crate) fn new(num_bits: usize) -> Self {
    let len = (num_bits + BLOCK_NBITS - 1) / BLOCK_NBITS;
    Self {
      slice: vec![0; len].into_boxed_slice(),
    }
  }

  pub(crate) fn from_bit(num_bits: usize, bit: usize) -> Self {
    let mut s = Self::new(num_bits);
    s.insert(bit);
    s
  }

  pub(crate) fn clear(&mut self) {
    for x in self.slice.iter_mut() {
      *x = 0;
    }
  }

  pub(crate) fn insert(&mut self, bit: usize) {
    self.slice[bit / BLOCK_NBITS] |= 1 << (bit % BLOCK_NBITS);
  }

  /// Returns whether the set has changed.
  pub(crate) fn union_with(&mut self, other: &BitSet) -> bool {
    let mut changed = false;
    for (a, b) in self.slice.iter_mut().zip(other.slice.iter()) {
      let old = *a;
      *a |= *b;
      changed |= old != *a;
    }
    changed
  }

  pub(crate) fn iter(&self) -> Iter {
    Iter {
      slice: &*self.slice,
      bit: 0,
      index: 0,
    }
  }

  pub(crate) fn contains(&self, bit: usize) -> bool {
    self.slice[bit / BLOCK_NBITS] & (1 << (bit % BLOCK_NBITS)) != 0
  }
}

pub(crate) struct Iter<'a> {
  slice: &'a [BitBlock],
  bit: usize,
  index: usize,
}

impl<'a> Iterator for Iter<'a> {
  type Item = usize;

  fn next(&mut self) -> Option<usize> {
    while self.index < self.slice.len() {
      if self.bit < BLOCK_NBITS {
        let mask = !((1u64 << self.bit) - 1);
        let bit = (self.slice[self.index] & mask).trailing_zeros() as usize;
        if bit < BLOCK_NBITS {
          self.bit = bit + 1;
          return Some(self.index * BLOCK_NBITS + bit);
        }
      }

      self.index += 1;
      self.bit = 0;
    }
    None
  }
}

impl Debug for BitSet {
  fn fmt(&self, f: &mut Formatter) -> fmt::Result {
    f.debug_set().entries(self.iter()).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::BitSet;
  use pretty_assertions::assert_eq;

  #[test]
  fn insert() {
    let mut set = BitSet::new(15);

    set.insert(7);
    set.insert(3);
    set.insert(7);
    set.insert(14);

    let vec = set.iter().collect::<Vec<_>>();

    assert_eq!(vec, vec![3, 7, 14]);
    assert!(set.contains(3));
    assert!(!set.contains(4));
  }

  #[test]
  fn union_across_blocks() {
    let mut a = BitSet::from_bit(130, 1);
    let b = BitSet::from_bit(130, 129);
    assert!(a.union_with(&b));
    assert!(!a.union_with(&b));
    assert_eq!(a.iter().collect::<Vec<_>>(), vec![1, 129]);
    assert!(a.contains(129));

    a.clear();
    assert_eq!(a.iter().next(), None);
  }
}
