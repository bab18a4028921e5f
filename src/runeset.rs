use std::fmt::{self, Debug, Display, Formatter};

/// Set of runes kept as sorted, non-adjacent, inclusive ranges.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct RuneSet {
  ranges: Vec<(u32, u32)>,
}

impl RuneSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_runes(runes: impl IntoIterator<Item = char>) -> Self {
    let mut set = Self::new();
    for c in runes {
      set.insert_range(c, c);
    }
    set
  }

  pub fn from_range(lo: char, hi: char) -> Self {
    let mut set = Self::new();
    set.insert_range(lo, hi);
    set
  }

  pub fn is_empty(&self) -> bool {
    self.ranges.is_empty()
  }

  pub fn insert_range(&mut self, lo: char, hi: char) {
    let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
    self.ranges.push((lo as u32, hi as u32));
    self.normalize();
  }

  pub fn union_with(&mut self, other: &RuneSet) {
    self.ranges.extend_from_slice(&other.ranges);
    self.normalize();
  }

  pub fn subtract(&mut self, other: &RuneSet) {
    let mut out = Vec::with_capacity(self.ranges.len());
    for &(lo, hi) in &self.ranges {
      let mut lo = lo;
      let mut alive = true;
      for &(olo, ohi) in &other.ranges {
        if ohi < lo || olo > hi {
          continue;
        }
        if olo > lo {
          out.push((lo, olo - 1));
        }
        if ohi >= hi {
          alive = false;
          break;
        }
        lo = ohi + 1;
      }
      if alive {
        out.push((lo, hi));
      }
    }
    self.ranges = out;
    self.normalize();
  }

  pub fn contains(&self, c: char) -> bool {
    let c = c as u32;
    self.ranges
      .binary_search_by(|&(lo, hi)| {
        if hi < c {
          std::cmp::Ordering::Less
        } else if lo > c {
          std::cmp::Ordering::Greater
        } else {
          std::cmp::Ordering::Equal
        }
      })
      .is_ok()
  }

  pub fn intersects(&self, other: &RuneSet) -> bool {
    let (mut i, mut j) = (0, 0);
    while i < self.ranges.len() && j < other.ranges.len() {
      let (alo, ahi) = self.ranges[i];
      let (blo, bhi) = other.ranges[j];
      if ahi < blo {
        i += 1;
      } else if bhi < alo {
        j += 1;
      } else {
        return true;
      }
    }
    false
  }

  pub fn is_subset(&self, other: &RuneSet) -> bool {
    let mut rest = self.clone();
    rest.subtract(other);
    rest.is_empty()
  }

  pub fn ranges(&self) -> impl Iterator<Item = (char, char)> + '_ {
    self.ranges.iter().filter_map(|&(lo, hi)| {
      Some((char::from_u32(lo)?, char::from_u32(hi)?))
    })
  }

  fn normalize(&mut self) {
    self.ranges.sort_unstable();
    let mut out: Vec<(u32, u32)> = Vec::with_capacity(self.ranges.len());
    for &(lo, hi) in &self.ranges {
      match out.last_mut() {
        Some(last) if lo <= last.1.saturating_add(1) => {
          last.1 = last.1.max(hi);
        }
        _ => out.push((lo, hi)),
      }
    }
    self.ranges = out;
  }
}

impl Display for RuneSet {
  fn fmt(&self, f: &mut Formatter) -> fmt::Result {
    for (lo, hi) in self.ranges() {
      if lo == hi {
        write!(f, "{}", lo.escape_default())?;
      } else if hi as u32 == lo as u32 + 1 {
        write!(f, "{}{}", lo.escape_default(), hi.escape_default())?;
      } else {
        write!(f, "{}-{}", lo.escape_default(), hi.escape_default())?;
      }
    }
    Ok(())
  }
}

impl Debug for RuneSet {
  fn fmt(&self, f: &mut Formatter) -> fmt::Result {
    write!(f, "[{}]", self)
  }
}

#[cfg(test)]
mod tests {
  use super::RuneSet;
  use pretty_assertions::assert_eq;

  #[test]
  fn merge_adjacent() {
    let set = RuneSet::from_runes("cabd".chars());
    assert_eq!(set.to_string(), "a-d");
    assert!(set.contains('b'));
    assert!(!set.contains('e'));
  }

  #[test]
  fn subtract_splits_range() {
    let mut set = RuneSet::from_range('a', 'z');
    set.subtract(&RuneSet::from_runes("mx".chars()));
    assert_eq!(set.to_string(), "a-ln-wyz");
  }

  #[test]
  fn intersects_and_subset() {
    let digits = RuneSet::from_range('0', '9');
    let odd = RuneSet::from_runes("13579".chars());
    let letters = RuneSet::from_range('a', 'z');
    assert!(digits.intersects(&odd));
    assert!(!digits.intersects(&letters));
    assert!(odd.is_subset(&digits));
    assert!(!digits.is_subset(&odd));
  }
}
