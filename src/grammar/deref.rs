//! Rewrites a compiled rule graph into its parseable form.
//!
//! Passes run in a fixed order: references, conditionals, literal merges,
//! procedures, groups, deduplication. Each pass walks the graph from the
//! named roots and replaces rules by redirecting their ids.

use std::collections::{HashMap, HashSet};
use crate::error::Error;
use crate::runeset::RuneSet;
use super::*;

pub(crate) fn dereference(ri: &mut RuleIndex) -> Result<(), Error> {
  resolve_references(ri)?;
  resolve_conditionals(ri)?;
  merge_literals(ri)?;
  resolve_procedures(ri)?;
  expand_groups(ri);
  deduplicate(ri);
  ri.compact();

  if let Some(id) = find_unresolved(ri) {
    panic!("rule survived dereference: {}", ri.id_str(id));
  }
  ri.mark_dereferenced();
  log::debug!("dereferenced {} reachable rules", ri.reachable().len());
  Ok(())
}

pub(crate) fn find_unresolved(ri: &RuleIndex) -> Option<RuleId> {
  ri.reachable().into_iter().find(|&id| ri.get(id).is_unresolved())
}

/// Visits each reachable rule once. When `f` redirects the visited rule, the
/// replacement is visited next.
fn walk<F>(ri: &mut RuleIndex, mut f: F) -> Result<(), Error>
where
  F: FnMut(&mut RuleIndex, RuleId) -> Result<(), Error>,
{
  let mut seen = HashSet::new();
  let mut stack = ri.roots();
  stack.reverse();
  while let Some(id) = stack.pop() {
    let id = ri.find(id);
    if !seen.insert(id) {
      continue;
    }
    f(ri, id)?;
    let now = ri.find(id);
    if now != id {
      stack.push(now);
      continue;
    }
    let mut children = ri.get(id).children();
    children.reverse();
    stack.extend(children);
  }
  Ok(())
}

/// Runs `f` over the whole graph, collecting errors instead of stopping.
fn walk_collect<F>(ri: &mut RuleIndex, mut f: F) -> Result<(), Error>
where
  F: FnMut(&mut RuleIndex, RuleId) -> Result<(), Error>,
{
  let mut errors = vec![];
  walk(ri, |ri, id| {
    if let Err(e) = f(ri, id) {
      errors.push(e);
    }
    Ok(())
  })?;
  match Error::from_list(errors) {
    Some(e) => Err(e),
    None => Ok(()),
  }
}

fn resolve_references(ri: &mut RuleIndex) -> Result<(), Error> {
  walk_collect(ri, |ri, id| {
    let (name, pos) = match ri.get(id) {
      Rule::Reference(r) => (r.name.clone(), r.pos),
      _ => return Ok(()),
    };
    match ri.lookup(&name) {
      Some(target) if target != id => {
        ri.redirect(id, target);
        Ok(())
      }
      _ => Err(ri.error_at(pos, format!("rule not found: {}", name))),
    }
  })
}

fn resolve_conditionals(ri: &mut RuleIndex) -> Result<(), Error> {
  walk_collect(ri, |ri, id| {
    let c = match ri.get(id) {
      Rule::Conditional(c) => c.clone(),
      _ => return Ok(()),
    };
    let value = match ri.get(c.flag) {
      Rule::BooleanFlag(b) => b.value,
      _ => {
        let msg = format!("not a boolean flag: {}", ri.id_str(c.flag));
        return Err(ri.error_at(c.pos, msg));
      }
    };
    ri.redirect(id, if value { c.then } else { c.otherwise });
    Ok(())
  })
}

fn merge_literals(ri: &mut RuleIndex) -> Result<(), Error> {
  walk_collect(ri, |ri, id| merge_literal(ri, id, &mut HashSet::new()))
}

/// Id of the literal behind `id`, looking through definitions.
fn literal_target(ri: &RuleIndex, id: RuleId) -> Option<RuleId> {
  let mut id = ri.find(id);
  let mut seen = HashSet::new();
  while seen.insert(id) {
    match ri.get(id) {
      Rule::Literal(_) => return Some(id),
      Rule::Definition(d) => id = ri.find(d.prod),
      _ => return None,
    }
  }
  None
}

fn merge_literal(
  ri: &mut RuleIndex,
  id: RuleId,
  visiting: &mut HashSet<RuleId>,
) -> Result<(), Error> {
  let (kind, reference, pos) = match ri.get(id) {
    Rule::Literal(Literal { kind, reference: Some(r), pos, .. }) => (*kind, *r, *pos),
    _ => return Ok(()),
  };
  if !visiting.insert(id) {
    return Err(ri.error_at(pos, "literal refers to itself"));
  }
  let target = match literal_target(ri, reference) {
    Some(t) => t,
    None => {
      let msg = format!("not a literal: {}", ri.id_str(reference));
      return Err(ri.error_at(pos, msg));
    }
  };
  merge_literal(ri, target, visiting)?;

  let child = match ri.get(target) {
    Rule::Literal(l) => l.clone(),
    _ => unreachable!(),
  };
  let compatible = match kind {
    LiteralKind::Sequence | LiteralKind::SequenceMid => child.kind == LiteralKind::Sequence,
    LiteralKind::AnyOf => matches!(child.kind, LiteralKind::Sequence | LiteralKind::AnyOf),
    LiteralKind::NoneOf => child.kind == LiteralKind::AnyOf,
  };
  if !compatible {
    let msg = format!("incompatible literal: cannot merge {:?} {} into {:?}",
      child.kind, child.id_str(), kind);
    return Err(ri.error_at(pos, msg));
  }

  if let Rule::Literal(l) = ri.get_mut(id) {
    l.reference = None;
    if kind.is_sequence() {
      l.runes.extend_from_slice(&child.runes);
    } else if child.kind.is_sequence() {
      l.set.union_with(&RuneSet::from_runes(child.runes.iter().copied()));
    } else {
      l.set.union_with(&child.set);
    }
  }
  Ok(())
}

fn resolve_procedures(ri: &mut RuleIndex) -> Result<(), Error> {
  walk_collect(ri, |ri, id| call_procedure(ri, id, 0))
}

fn call_procedure(ri: &mut RuleIndex, id: RuleId, depth: usize) -> Result<(), Error> {
  let p = match ri.get(id) {
    Rule::Procedure(p) => p.clone(),
    _ => return Ok(()),
  };
  if depth > 32 {
    return Err(ri.error_at(p.pos, "procedure nesting too deep"));
  }
  let mut args = Vec::with_capacity(p.args.len());
  for arg in &p.args {
    args.push(match *arg {
      ProcArg::Rule(a) => {
        call_procedure(ri, a, depth + 1)?;
        ProcArg::Rule(ri.find(a))
      }
      ProcArg::Int(i) => ProcArg::Int(i),
    });
  }
  let handler = match ri.procedure(&p.name) {
    Some(h) => h,
    None => return Err(ri.error_at(p.pos, format!("unknown procedure: {}", p.name))),
  };
  match handler(ri, &args) {
    Ok(rule) => {
      ri.redirect(id, rule);
      Ok(())
    }
    Err(msg) => Err(ri.error_at(p.pos, format!("@{}: {}", p.name, msg))),
  }
}

fn expand_groups(ri: &mut RuleIndex) {
  let mut memo = HashMap::new();
  let result = walk(ri, |ri, id| {
    let g = match ri.get(id) {
      Rule::Group(g) => g.clone(),
      _ => return Ok(()),
    };
    let to = match g.repeat {
      None => g.child,
      Some(repeat) => synthesize(ri, &mut memo, g.child, repeat, g.pos),
    };
    ri.redirect(id, to);
    Ok(())
  });
  debug_assert!(result.is_ok());
}

/// Definition standing for `(child)` with a repetition operator, shared by
/// identical groups.
fn synthesize(
  ri: &mut RuleIndex,
  memo: &mut HashMap<String, RuleId>,
  child: RuleId,
  repeat: Repeat,
  pos: usize,
) -> RuleId {
  let name = format!("({}){}", ri.id_str(child), repeat.op());
  if let Some(&id) = memo.get(&name) {
    return id;
  }
  let empty = ri.empty;
  let def = ri.add(Rule::Definition(Definition::new(name.clone(), empty)));
  memo.insert(name, def);

  let prod = match repeat {
    // def = child | nil
    Repeat::Optional => ri.add(Rule::Alternation(vec![child, empty])),
    // def = def child | nil
    Repeat::ZeroOrMore => {
      let seq = ri.add(Rule::Sequence(vec![def, child]));
      ri.add(Rule::Alternation(vec![seq, empty]))
    }
    // def = (child)* child
    Repeat::OneOrMore => {
      let loop_def = synthesize(ri, memo, child, Repeat::ZeroOrMore, pos);
      ri.add(Rule::Sequence(vec![loop_def, child]))
    }
  };
  if let Rule::Definition(d) = ri.get_mut(def) {
    d.prod = prod;
    d.repeat = Some(repeat);
    d.no_reverse = repeat == Repeat::ZeroOrMore;
    d.pos = pos;
  }
  def
}

fn deduplicate(ri: &mut RuleIndex) {
  let mut seen: HashMap<(u8, String), RuleId> = HashMap::new();
  for id in ri.reachable() {
    let tag = match ri.get(id) {
      Rule::Sequence(_) => 0,
      Rule::Alternation(_) => 1,
      Rule::Literal(_) => 2,
      Rule::Function(_) => 3,
      _ => continue,
    };
    let key = (tag, ri.id_str(id));
    match seen.get(&key) {
      Some(&first) => ri.redirect(id, first),
      None => {
        seen.insert(key, id);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn deref(src: &str) -> Result<RuleIndex, Error> {
    let mut ri = RuleIndex::new();
    ri.set_boolean_flag("on", true);
    ri.set_boolean_flag("off", false);
    ri.parse_grammar("test", src)?;
    dereference(&mut ri)?;
    Ok(ri)
  }

  #[test]
  fn expands_repetitions() {
    let ri = deref("s = (a)+; a = \"x\";").unwrap();
    assert_eq!(
      ri.dump(),
      "s = (a)+;\n(a)+ = ((a)* a);\n(a)* = (((a)* a) | nil);\na = \"x\";\n",
    );
    assert_eq!(find_unresolved(&ri), None);
  }

  #[test]
  fn identical_groups_share_definition() {
    let ri = deref("s = (a)* \",\" (a)*; a = \"x\";").unwrap();
    let seq = match ri.get(ri.lookup("s").unwrap()) {
      Rule::Definition(d) => ri.get(d.prod).children(),
      r => panic!("unexpected {:?}", r),
    };
    assert_eq!(seq[0], seq[2]);
    match ri.get(seq[0]) {
      Rule::Definition(d) => {
        assert_eq!(d.repeat, Some(Repeat::ZeroOrMore));
        assert!(d.no_reverse);
      }
      r => panic!("unexpected {:?}", r),
    }
  }

  #[test]
  fn conditionals_pick_branch() {
    let ri = deref("s = if on ? a : b; t = if off ? a : b; a = \"x\"; b = \"y\";").unwrap();
    let prod = |name: &str| match ri.get(ri.lookup(name).unwrap()) {
      Rule::Definition(d) => ri.id_str(d.prod),
      r => panic!("unexpected {:?}", r),
    };
    assert_eq!(prod("s"), "a");
    assert_eq!(prod("t"), "b");
  }

  #[test]
  fn merges_literal_references() {
    let ri = deref("s = (b)! (a)% (a)~; b = (a)%; a = \"xy\";").unwrap();
    match ri.get(ri.lookup("s").unwrap()) {
      Rule::Definition(d) => assert_eq!(ri.id_str(d.prod), "([xy]! [xy]% \"xy\"~)"),
      r => panic!("unexpected {:?}", r),
    }
  }

  #[test]
  fn incompatible_literal_merge() {
    let err = deref("s = (a)!; a = \"xy\";").err().unwrap();
    assert!(err.to_string().contains("incompatible literal"), "{}", err);
  }

  #[test]
  fn missing_references_are_aggregated() {
    let err = deref("s = a b;").err().unwrap();
    assert_eq!(
      err.to_string(),
      "test:1:5: rule not found: a: \"s = ●a b;\"\n\
       test:1:7: rule not found: b: \"s = a ●b;\"",
    );
  }

  #[test]
  fn procedures() {
    let ri = deref("s = @dropRunes(@range(\"a\", \"e\"), \"c\");").unwrap();
    match ri.get(ri.lookup("s").unwrap()) {
      Rule::Definition(d) => assert_eq!(ri.id_str(d.prod), "[abde]%"),
      r => panic!("unexpected {:?}", r),
    }

    let err = deref("s = @nope(1);").err().unwrap();
    assert!(err.to_string().contains("unknown procedure: nope"));

    let err = deref("s = @range(1);").err().unwrap();
    assert!(err.to_string().contains("@range: expecting 2 arguments"));
  }

  #[test]
  fn deduplicates_literals() {
    let mut ri = RuleIndex::new();
    ri.set_string_rule("comma", ",");
    ri.parse_grammar("test", "s = comma \",\";").unwrap();
    dereference(&mut ri).unwrap();
    let seq = match ri.get(ri.lookup("s").unwrap()) {
      Rule::Definition(d) => ri.get(d.prod).children(),
      r => panic!("unexpected {:?}", r),
    };
    assert_eq!(seq[0], seq[1]);
  }

  #[test]
  fn deduplicates_functions() {
    let ri = deref(r#"s = @escapeAny("\\") (@escapeAny("\\"))?;"#).unwrap();
    let seq = match ri.get(ri.lookup("s").unwrap()) {
      Rule::Definition(d) => ri.get(d.prod).children(),
      r => panic!("unexpected {:?}", r),
    };
    let opt = match ri.get(seq[1]) {
      Rule::Definition(d) => ri.get(d.prod).children(),
      r => panic!("unexpected {:?}", r),
    };
    assert_eq!(seq[0], opt[0]);
  }
}
