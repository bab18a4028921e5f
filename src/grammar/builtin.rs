//! Names every rule index starts with.

use std::sync::Arc;
use crate::runeset::RuneSet;
use crate::scanner::Scanner;
use super::{Literal, LiteralKind, ProcArg, RuleId, RuleIndex};

pub(super) fn register(ri: &mut RuleIndex) {
  let empty = ri.empty;
  ri.set_name("nil", empty);

  ri.set_function_rule("letter", 0, |s| s.rune_fn(char::is_alphabetic));
  ri.set_function_rule("digit", 0, |s| s.rune_fn(char::is_numeric));
  ri.set_function_rule("space", 0, |s| s.rune_fn(char::is_whitespace));
  ri.set_function_rule("anyRune", 10, |s| s.read_rune().is_some());
  ri.set_function_rule("quotedString", -1, |s| s.quoted_string('\\', "\"'`"));

  ri.set_procedure_handler("range", range);
  ri.set_procedure_handler("dropRunes", drop_runes);
  ri.set_procedure_handler("escapeAny", escape_any);
}

fn single_rune(ri: &RuleIndex, arg: &ProcArg) -> Result<char, String> {
  match arg {
    ProcArg::Int(i) => u32::try_from(*i).ok()
      .and_then(char::from_u32)
      .ok_or_else(|| format!("invalid rune code: {}", i)),
    ProcArg::Rule(id) => match ri.literal_of(*id) {
      Some(l) if l.kind.is_sequence() && l.runes.len() == 1 => Ok(l.runes[0]),
      _ => Err(format!("expecting a single rune: {}", ri.id_str(*id))),
    },
  }
}

/// `@range(lo, hi)`
fn range(ri: &mut RuleIndex, args: &[ProcArg]) -> Result<RuleId, String> {
  if args.len() != 2 {
    return Err(format!("expecting 2 arguments, got {}", args.len()));
  }
  let lo = single_rune(ri, &args[0])?;
  let hi = single_rune(ri, &args[1])?;
  Ok(ri.add_literal(Literal::set(LiteralKind::AnyOf, RuneSet::from_range(lo, hi))))
}

/// `@dropRunes(set, other, ...)`: the runes of `set` except the others'.
fn drop_runes(ri: &mut RuleIndex, args: &[ProcArg]) -> Result<RuleId, String> {
  let (first, rest) = args.split_first()
    .ok_or_else(|| "expecting at least 1 argument".to_owned())?;
  let lit = |arg: &ProcArg| match arg {
    ProcArg::Rule(id) => ri.literal_of(*id)
      .filter(|l| l.reference.is_none())
      .cloned()
      .map(|l| if l.kind.is_sequence() { l.with_kind(LiteralKind::AnyOf) } else { l })
      .ok_or_else(|| format!("expecting a literal: {}", ri.id_str(*id))),
    ProcArg::Int(i) => Err(format!("expecting a literal: {}", i)),
  };

  let mut out = lit(first)?;
  for arg in rest {
    let other = lit(arg)?;
    if other.kind != LiteralKind::AnyOf {
      return Err("can only drop any-of runes".to_owned());
    }
    match out.kind {
      LiteralKind::AnyOf => out.set.subtract(&other.set),
      // none-of gets wider when runes are dropped from what it accepts
      _ => out.set.union_with(&other.set),
    }
  }
  Ok(ri.add_literal(out))
}

/// `@escapeAny(esc)`: the escape rune followed by any rune.
fn escape_any(ri: &mut RuleIndex, args: &[ProcArg]) -> Result<RuleId, String> {
  if args.len() != 1 {
    return Err(format!("expecting 1 argument, got {}", args.len()));
  }
  let esc = single_rune(ri, &args[0])?;
  let name = format!("escapeAny({:?})", esc);
  let matcher = move |s: &mut Scanner| {
    s.attempt(|s| {
      if s.is_reverse() {
        s.read_rune().is_some() && s.rune(esc)
      } else {
        s.rune(esc) && s.read_rune().is_some()
      }
    })
  };
  Ok(ri.add_function(&name, 0, Arc::new(matcher)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::grammar::Rule;
  use pretty_assertions::assert_eq;

  #[test]
  fn range_builds_any_of() {
    let mut ri = RuleIndex::new();
    let lo = ri.add_literal(Literal::sequence("a".chars()));
    let id = range(&mut ri, &[ProcArg::Rule(lo), ProcArg::Int('f' as i64)]).unwrap();
    assert_eq!(ri.id_str(id), "[a-f]%");
  }

  #[test]
  fn drop_runes_from_any_of() {
    let mut ri = RuleIndex::new();
    let a = ri.add_literal(Literal::sequence("abcd".chars()));
    let b = ri.add_literal(Literal::set(LiteralKind::AnyOf, RuneSet::from_runes("bc".chars())));
    let id = drop_runes(&mut ri, &[ProcArg::Rule(a), ProcArg::Rule(b)]).unwrap();
    assert_eq!(ri.id_str(id), "[ad]%");
  }

  #[test]
  fn escape_any_matches_pair() {
    let mut ri = RuleIndex::new();
    let id = escape_any(&mut ri, &[ProcArg::Int('\\' as i64)]).unwrap();
    let f = match ri.get(id) {
      Rule::Function(f) => f.clone(),
      r => panic!("unexpected {:?}", r),
    };
    let mut s = Scanner::new(br"x\ny", 1, false);
    assert!((f.matcher)(&mut s));
    assert_eq!(s.pos(), 3);

    let mut s = Scanner::new(br"x\ny", 3, true);
    assert!((f.matcher)(&mut s));
    assert_eq!(s.pos(), 1);
  }
}
