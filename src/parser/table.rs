use std::cmp::Ordering;
use indexmap::IndexMap;
use crate::bnf::*;
use crate::error::Error;
use crate::grammar::{Literal, LiteralKind, Rule, RuleIndex};
use super::state::Vertices;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Action {
  Shift(usize),
  Reduce(ProdId),
  Accept,
}

pub(crate) struct State {
  pub(crate) actions: IndexMap<TermId, Action>,
  pub(crate) gotos: IndexMap<NontermId, usize>,
  /// Terminals with an action, in the order they are tried.
  pub(crate) candidates: Vec<TermId>,
}

pub(crate) struct Table {
  pub(crate) states: Vec<State>,
}

/// Turns vertices into parse states, reporting conflicts and overlapping
/// literal candidates.
pub(crate) fn gen_table(
  ri: &RuleIndex,
  bnf: &Bnf,
  vertices: &Vertices,
  shift_on_conflict: bool,
) -> Result<Table, Error> {
  let mut states = Vec::with_capacity(vertices.vertices.len());
  let mut errors = vec![];

  for (ix, vertex) in vertices.vertices.values().enumerate() {
    let mut proposed: IndexMap<TermId, Vec<Action>> = IndexMap::new();
    let mut gotos = IndexMap::new();

    for (&sym, &target) in &vertex.transitions {
      match sym {
        Symbol::Term(t) => proposed.entry(t).or_default().push(Action::Shift(target)),
        Symbol::Nonterm(n) => {
          gotos.insert(n, target);
        }
      }
    }

    for (item, la) in &vertex.items {
      if !item.is_complete(bnf) {
        continue;
      }
      for t in la.iter() {
        let t = TermId(t as u32);
        let action = if item.prod == START_PROD {
          if t != END_OF_INPUT {
            continue;
          }
          Action::Accept
        } else {
          Action::Reduce(item.prod)
        };
        let actions = proposed.entry(t).or_default();
        if !actions.contains(&action) {
          actions.push(action);
        }
      }
    }

    let mut actions = IndexMap::new();
    for (t, list) in proposed {
      if list.len() == 1 {
        actions.insert(t, list[0]);
        continue;
      }
      let shifts: Vec<Action> = list.iter()
        .copied()
        .filter(|a| matches!(a, Action::Shift(_)))
        .collect();
      if shift_on_conflict && shifts.len() == 1 {
        actions.insert(t, shifts[0]);
        continue;
      }
      let kind = if shifts.is_empty() { "reduce/reduce" } else { "shift/reduce" };
      let described = list.iter()
        .map(|&a| describe_action(ri, bnf, a))
        .collect::<Vec<_>>()
        .join(", ");
      errors.push(Error::Conflict {
        location: ri.location_at(conflict_pos(ri, bnf, &list)),
        kind,
        state: ix,
        rule: ri.id_str(bnf.term_rule(t)),
        actions: described,
      });
      actions.insert(t, list[0]);
    }

    let mut candidates: Vec<TermId> = actions.keys().copied().collect();
    candidates.sort_by(|&a, &b| parse_order(ri, bnf, a, b));

    errors.extend(check_overlap(ri, bnf, ix, &candidates));

    states.push(State {
      actions,
      gotos,
      candidates,
    });
  }

  match Error::from_list(errors) {
    Some(e) => Err(e),
    None => Ok(Table {
      states,
    }),
  }
}

pub(crate) fn describe_action(ri: &RuleIndex, bnf: &Bnf, action: Action) -> String {
  match action {
    Action::Shift(s) => format!("shift {}", s),
    Action::Reduce(p) => format!("reduce {}", bnf.prod_str(ri, p, None)),
    Action::Accept => "accept".to_owned(),
  }
}

/// Grammar offset of the definition behind the first reduction in `list`.
fn conflict_pos(ri: &RuleIndex, bnf: &Bnf, list: &[Action]) -> usize {
  list.iter()
    .find_map(|&a| match a {
      Action::Reduce(p) => bnf.nonterms[bnf.prods[p.0 as usize].nonterm_id.0 as usize].rule,
      _ => None,
    })
    .and_then(|rule| match ri.get(rule) {
      Rule::Definition(d) => Some(d.pos),
      _ => None,
    })
    .unwrap_or(0)
}

/// Sequences first, longest first, then functions by priority, then any-of,
/// then none-of, end of input last.
fn parse_order(ri: &RuleIndex, bnf: &Bnf, a: TermId, b: TermId) -> Ordering {
  let key = |t: TermId| {
    let rule = bnf.term_rule(t);
    let (class, sub) = match ri.get(rule) {
      Rule::Literal(l) => match l.kind {
        LiteralKind::Sequence | LiteralKind::SequenceMid => (0, -(l.runes.len() as i64)),
        LiteralKind::AnyOf => (2, 0),
        LiteralKind::NoneOf => (3, 0),
      },
      Rule::Function(f) => (1, f.priority as i64),
      _ => (4, 0),
    };
    (class, sub, ri.id_str(rule))
  };
  key(a).cmp(&key(b))
}

fn check_overlap(
  ri: &RuleIndex,
  bnf: &Bnf,
  state: usize,
  candidates: &[TermId],
) -> Vec<Error> {
  let literals: Vec<(TermId, &Literal)> = candidates.iter()
    .filter_map(|&t| match ri.get(bnf.term_rule(t)) {
      Rule::Literal(l) => Some((t, l)),
      _ => None,
    })
    .collect();

  let mut errors = vec![];
  for (i, &(ta, a)) in literals.iter().enumerate() {
    for &(tb, b) in &literals[i + 1..] {
      if overlaps(a, b, bnf.reverse) {
        let pos = if a.pos != 0 { a.pos } else { b.pos };
        errors.push(Error::LiteralOverlap {
          location: ri.location_at(pos),
          state,
          a: ri.id_str(bnf.term_rule(ta)),
          b: ri.id_str(bnf.term_rule(tb)),
        });
      }
    }
  }
  errors
}

/// Whether the first rune read by `a` could also start `b`.
///
/// Pairs of sequences are not checked: candidates try longer sequences
/// first, so `"ab"` before `"a"` or `"ac"` is an ordering, not an ambiguity.
fn overlaps(a: &Literal, b: &Literal, reverse: bool) -> bool {
  if a.kind.is_sequence() && b.kind.is_sequence() {
    return false;
  }
  match (a.coverage(reverse), b.coverage(reverse)) {
    (Some(x), Some(y)) => x.intersects(&y),
    (None, Some(y)) => !y.is_subset(&a.set),
    (Some(x), None) => !x.is_subset(&b.set),
    (None, None) => true,
  }
}
