use crate::bnf::*;
use super::bitset::BitSet;

/// Nullable flags and FIRST sets of every nonterminal, by fixed-point
/// iteration.
pub(crate) struct FirstSets {
  pub(crate) nullable: Vec<bool>,
  pub(crate) first: Vec<BitSet>,
}

impl FirstSets {
  pub(crate) fn new(bnf: &Bnf) -> Self {
    let nullable = gen_nullable(bnf);
    let first = gen_first(bnf, &nullable);
    FirstSets {
      nullable,
      first,
    }
  }

  /// Adds FIRST of `symbols` to `result`, then `lookaheads` when all of
  /// `symbols` are nullable. Returns whether they are.
  pub(crate) fn first_of_symbols(
    &self,
    result: &mut BitSet,
    symbols: &[Symbol],
    lookaheads: Option<&BitSet>,
  ) -> bool {
    compute_first_for_symbols(result, &self.first, &self.nullable, symbols,
      lookaheads)
  }
}

fn gen_nullable(
  bnf: &Bnf,
) -> Vec<bool> {
  let mut nullable = vec![false; bnf.nonterms.len()];

  loop {
    let mut changed = false;
    for prod in &bnf.prods {
      let nt_ix = prod.nonterm_id.0 as usize;
      if !nullable[nt_ix]
        && prod.symbols.iter().all(|sym| is_nullable(&nullable, sym))
      {
        nullable[nt_ix] = true;
        changed = true;
      }
    }
    if !changed {
      break;
    }
  }

  nullable
}

fn is_nullable(nullable: &[bool], sym: &Symbol) -> bool {
  match sym {
    Symbol::Term(_) => false,
    Symbol::Nonterm(id) => nullable[id.0 as usize],
  }
}

fn gen_first(
  bnf: &Bnf,
  nullable: &[bool],
) -> Vec<BitSet> {
  let mut buf = BitSet::new(bnf.num_terms());
  let mut first = vec![buf.clone(); bnf.nonterms.len()];

  loop {
    let mut changed = false;
    for prod in &bnf.prods {
      buf.clear();
      compute_first_for_symbols(&mut buf, &first, nullable, &prod.symbols,
        None);
      changed |= first[prod.nonterm_id.0 as usize].union_with(&buf);
    }
    if !changed {
      break;
    }
  }

  first
}

fn compute_first_for_symbols(
  result: &mut BitSet,
  first: &[BitSet],
  nullable: &[bool],
  symbols: &[Symbol],
  lookaheads: Option<&BitSet>,
) -> bool {
  for sym in symbols {
    match sym {
      Symbol::Term(id) => {
        result.insert(id.0 as usize);
        return false;
      }
      Symbol::Nonterm(id) => {
        result.union_with(&first[id.0 as usize]);
        if !nullable[id.0 as usize] {
          return false;
        }
      }
    }
  }

  if let Some(lookaheads) = lookaheads {
    result.union_with(lookaheads);
  }
  true
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bnf::tests::bnf;
  use pretty_assertions::assert_eq;

  fn first_names(src: &str, name: &str) -> (bool, Vec<String>) {
    let (ri, bnf) = bnf(src, false);
    let sets = FirstSets::new(&bnf);
    let id = bnf.nonterm_id(ri.lookup(name).unwrap()).unwrap();
    let names = sets.first[id.0 as usize].iter()
      .map(|t| bnf.sym_name(&ri, Symbol::Term(TermId(t as u32))))
      .collect();
    (sets.nullable[id.0 as usize], names)
  }

  const SIMPLE: &str = r#"
    S = "d" | X Y S;
    Y = nil | "c";
    X = Y | "a";
  "#;

  #[test]
  fn simple_nullable() {
    let (ri, bnf) = bnf(SIMPLE, false);
    let sets = FirstSets::new(&bnf);
    let named = |name: &str| {
      let id = bnf.nonterm_id(ri.lookup(name).unwrap()).unwrap();
      sets.nullable[id.0 as usize]
    };
    assert_eq!((named("S"), named("X"), named("Y")), (false, true, true));
  }

  #[test]
  fn simple_first() {
    assert_eq!(first_names(SIMPLE, "S"), (false, vec![
      "\"d\"".to_owned(),
      "\"a\"".to_owned(),
      "\"c\"".to_owned(),
    ]));
    assert_eq!(first_names(SIMPLE, "X"), (true, vec![
      "\"a\"".to_owned(),
      "\"c\"".to_owned(),
    ]));
  }

  #[test]
  fn left_recursion_terminates() {
    let src = "S = S \"+\" T | T; T = T \"*\" \"x\" | \"x\";";
    assert_eq!(first_names(src, "S"), (false, vec!["\"x\"".to_owned()]));
  }

  #[test]
  fn lookaheads_follow_nullable_tail() {
    let (ri, bnf) = bnf(SIMPLE, false);
    let sets = FirstSets::new(&bnf);
    let x = bnf.nonterm_id(ri.lookup("X").unwrap()).unwrap();
    let la = BitSet::from_bit(bnf.num_terms(), END_OF_INPUT.0 as usize);
    let mut out = BitSet::new(bnf.num_terms());
    assert!(sets.first_of_symbols(&mut out, &[Symbol::Nonterm(x)], Some(&la)));
    assert!(out.contains(END_OF_INPUT.0 as usize));
  }
}
