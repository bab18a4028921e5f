//! Grammar-driven LALR(1) parsing of rune streams, forward or backward.
//!
//! A grammar is compiled into a [`RuleIndex`], dereferenced, and turned into
//! content parsers, one per start rule and direction.

pub mod error;
pub mod grammar;
pub mod parser;
pub mod runeset;
pub mod scanner;
mod bnf;

pub use error::{CallbackError, Error, Location};
pub use grammar::{RuleId, RuleIndex};
pub use parser::{ContentParser, CpNode, CpOptions, LrParser, NodeView, ParseTree};

/// Dereferences `ri` if needed and wraps it for building content parsers.
pub fn build(ri: RuleIndex) -> Result<LrParser, Error> {
  LrParser::new(ri)
}

/// Parses backward from `index` with `reverse`, then forward with `forward`
/// from where the backward parse stopped.
pub fn parse_around<'a>(
  reverse: &'a ContentParser,
  forward: &'a ContentParser,
  src: &'a [u8],
  index: usize,
) -> Result<ParseTree<'a>, Error> {
  let start = reverse.parse(src, index)?.span().start;
  forward.parse(src, start)
}
