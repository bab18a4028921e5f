//! Rune scanner over a byte buffer.
//!
//! A scanner reads either forward (towards the end of the buffer) or in
//! reverse (towards offset 0). Every matching method restores the position
//! when it fails, so callers can try alternatives without bookkeeping.

use crate::runeset::RuneSet;

const REPLACEMENT: char = '\u{FFFD}';

#[derive(Debug, Clone)]
pub struct Scanner<'a> {
  src: &'a [u8],
  pos: usize,
  reverse: bool,
}

impl<'a> Scanner<'a> {
  pub fn new(src: &'a [u8], pos: usize, reverse: bool) -> Self {
    Scanner {
      src,
      pos: pos.min(src.len()),
      reverse,
    }
  }

  pub fn src(&self) -> &'a [u8] {
    self.src
  }

  pub fn pos(&self) -> usize {
    self.pos
  }

  pub fn set_pos(&mut self, pos: usize) {
    self.pos = pos.min(self.src.len());
  }

  pub fn is_reverse(&self) -> bool {
    self.reverse
  }

  /// Whether no rune is left in the scanning direction.
  pub fn is_end(&self) -> bool {
    if self.reverse {
      self.pos == 0
    } else {
      self.pos >= self.src.len()
    }
  }

  /// Next rune in the scanning direction and its width in bytes.
  pub fn peek_rune(&self) -> Option<(char, usize)> {
    if self.is_end() {
      return None;
    }
    if self.reverse {
      let min = self.pos.saturating_sub(4);
      let mut start = self.pos - 1;
      while start > min && is_continuation(self.src[start]) {
        start -= 1;
      }
      match decode(&self.src[start..self.pos]) {
        Some((c, w)) if w == self.pos - start => Some((c, w)),
        _ => Some((REPLACEMENT, 1)),
      }
    } else {
      let end = (self.pos + 4).min(self.src.len());
      decode(&self.src[self.pos..end]).or(Some((REPLACEMENT, 1)))
    }
  }

  pub fn read_rune(&mut self) -> Option<char> {
    let (c, w) = self.peek_rune()?;
    self.advance(w);
    Some(c)
  }

  fn advance(&mut self, width: usize) {
    if self.reverse {
      self.pos -= width;
    } else {
      self.pos += width;
    }
  }

  /// Runs `f`, restoring the position if it returns false.
  pub fn attempt(&mut self, f: impl FnOnce(&mut Self) -> bool) -> bool {
    let pos = self.pos;
    if f(self) {
      true
    } else {
      self.pos = pos;
      false
    }
  }

  pub fn rune_fn(&mut self, f: impl Fn(char) -> bool) -> bool {
    match self.peek_rune() {
      Some((c, w)) if f(c) => {
        self.advance(w);
        true
      }
      _ => false,
    }
  }

  /// Zero or more runes satisfying `f`; returns whether any was read.
  pub fn runes_fn(&mut self, f: impl Fn(char) -> bool) -> bool {
    let pos = self.pos;
    while self.rune_fn(&f) {}
    self.pos != pos
  }

  pub fn rune(&mut self, c: char) -> bool {
    self.rune_fn(|r| r == c)
  }

  /// Matches `runes` in their natural order, wherever the direction.
  pub fn sequence(&mut self, runes: &[char]) -> bool {
    if self.reverse {
      self.attempt(|s| runes.iter().rev().all(|&c| s.rune(c)))
    } else {
      self.attempt(|s| runes.iter().all(|&c| s.rune(c)))
    }
  }

  /// Like `sequence`, but the current position may already sit inside the
  /// sequence. Reads up to the sequence boundary in the scanning direction.
  pub fn sequence_mid(&mut self, runes: &[char]) -> bool {
    let text = runes.iter().collect::<String>();
    let bytes = text.as_bytes();
    if bytes.is_empty() {
      return false;
    }
    for k in 0..bytes.len() {
      let boundary = if self.reverse { bytes.len() - k } else { k };
      if !text.is_char_boundary(boundary) {
        continue;
      }
      if self.reverse {
        // cursor sits k bytes before the sequence end
        let seq_end = self.pos + k;
        if seq_end <= self.src.len()
          && seq_end >= bytes.len()
          && &self.src[seq_end - bytes.len()..seq_end] == bytes
        {
          self.pos = seq_end - bytes.len();
          return true;
        }
      } else if self.pos >= k {
        let start = self.pos - k;
        if self.src[start..].starts_with(bytes) {
          self.pos = start + bytes.len();
          return true;
        }
      }
    }
    false
  }

  pub fn any_of(&mut self, set: &RuneSet) -> bool {
    self.rune_fn(|c| set.contains(c))
  }

  pub fn none_of(&mut self, set: &RuneSet) -> bool {
    self.rune_fn(|c| !set.contains(c))
  }

  pub fn spaces(&mut self) -> bool {
    self.runes_fn(char::is_whitespace)
  }

  /// A quoted string opened and closed by one of `quotes`; runes preceded by
  /// `esc` never close it.
  pub fn quoted_string(&mut self, esc: char, quotes: &str) -> bool {
    self.attempt(|s| {
      let q = match s.peek_rune() {
        Some((q, _)) if quotes.contains(q) => q,
        _ => return false,
      };
      if s.reverse && s.escaped_before(s.pos - q.len_utf8(), esc) {
        return false;
      }
      s.read_rune();
      loop {
        let c = match s.read_rune() {
          Some(c) => c,
          None => return false,
        };
        if s.reverse {
          if c == q && !s.escaped_before(s.pos, esc) {
            return true;
          }
        } else if c == esc {
          if s.read_rune().is_none() {
            return false;
          }
        } else if c == q {
          return true;
        }
      }
    })
  }

  /// Whether the rune ending at `pos` is escaped by an odd run of `esc`.
  fn escaped_before(&self, pos: usize, esc: char) -> bool {
    let mut back = Scanner::new(self.src, pos, true);
    let mut n = 0;
    while back.rune(esc) {
      n += 1;
    }
    n % 2 == 1
  }

  /// Bytes between `a` and `b`, whichever order they come in.
  pub fn slice(&self, a: usize, b: usize) -> &'a [u8] {
    let (a, b) = if a <= b { (a, b) } else { (b, a) };
    &self.src[a.min(self.src.len())..b.min(self.src.len())]
  }
}

fn is_continuation(b: u8) -> bool {
  b & 0b1100_0000 == 0b1000_0000
}

fn decode(bytes: &[u8]) -> Option<(char, usize)> {
  let first = *bytes.first()?;
  let width = match first {
    0x00..=0x7f => 1,
    0xc0..=0xdf => 2,
    0xe0..=0xef => 3,
    0xf0..=0xf7 => 4,
    _ => return None,
  };
  let s = std::str::from_utf8(bytes.get(..width)?).ok()?;
  s.chars().next().map(|c| (c, width))
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn read_runes_both_ways() {
    let src = "aé€b".as_bytes();
    let mut s = Scanner::new(src, 0, false);
    let fwd = std::iter::from_fn(|| s.read_rune()).collect::<String>();
    assert_eq!(fwd, "aé€b");

    let mut s = Scanner::new(src, src.len(), true);
    let rev = std::iter::from_fn(|| s.read_rune()).collect::<String>();
    assert_eq!(rev, "b€éa");
    assert!(s.is_end());
  }

  #[test]
  fn invalid_bytes_read_as_replacement() {
    let src = [b'a', 0xff, b'b'];
    let mut s = Scanner::new(&src, 0, false);
    let fwd = std::iter::from_fn(|| s.read_rune()).collect::<String>();
    assert_eq!(fwd, "a\u{FFFD}b");

    let mut s = Scanner::new(&src, 3, true);
    let rev = std::iter::from_fn(|| s.read_rune()).collect::<String>();
    assert_eq!(rev, "b\u{FFFD}a");
  }

  #[test]
  fn sequence_restores_on_failure() {
    let runes = ['a', 'b', 'c'];
    let mut s = Scanner::new(b"abx", 0, false);
    assert!(!s.sequence(&runes));
    assert_eq!(s.pos(), 0);

    let mut s = Scanner::new(b"xabc", 4, true);
    assert!(s.sequence(&runes));
    assert_eq!(s.pos(), 1);
  }

  #[test]
  fn sequence_mid() {
    let runes = [':', '/', '/'];
    let src = b"http://x";
    let mut s = Scanner::new(src, 5, false);
    assert!(s.sequence_mid(&runes));
    assert_eq!(s.pos(), 7);

    let mut s = Scanner::new(src, 6, true);
    assert!(s.sequence_mid(&runes));
    assert_eq!(s.pos(), 4);

    let mut s = Scanner::new(src, 1, false);
    assert!(!s.sequence_mid(&runes));
    assert_eq!(s.pos(), 1);
  }

  #[test]
  fn quoted_string() {
    let src = br#"x "a\"b" y"#;
    let mut s = Scanner::new(src, 2, false);
    assert!(s.quoted_string('\\', "\"'"));
    assert_eq!(s.pos(), 8);

    let mut s = Scanner::new(src, 8, true);
    assert!(s.quoted_string('\\', "\"'"));
    assert_eq!(s.pos(), 2);

    let mut s = Scanner::new(b"\"abc", 0, false);
    assert!(!s.quoted_string('\\', "\""));
    assert_eq!(s.pos(), 0);
  }
}
