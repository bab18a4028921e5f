use std::collections::{HashMap, VecDeque};
use indexmap::IndexMap;
use crate::error::Error;
use crate::grammar::*;

/// Flat view of a dereferenced rule graph, as seen from one start rule in
/// one parse direction.
///
/// Definitions, alternations and sequences become nonterminals; literals,
/// functions and end of input become terminals. Nonterminal 0 is the
/// augmented start, with production 0 deriving the start rule.
pub(crate) struct Bnf {
  pub(crate) terms: IndexMap<RuleId, TermId>,
  pub(crate) nonterm_ids: HashMap<RuleId, NontermId>,
  pub(crate) nonterms: Vec<Nonterm>,
  pub(crate) prods: Vec<Production>,
  pub(crate) reverse: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub(crate) enum Symbol {
  Term(TermId),
  Nonterm(NontermId),
}

#[derive(Clone, PartialEq, Eq, Hash, Copy, PartialOrd, Ord, Debug)]
pub(crate) struct TermId(pub(crate) u32);

#[derive(Clone, PartialEq, Eq, Hash, Copy, PartialOrd, Ord, Debug)]
pub(crate) struct NontermId(pub(crate) u32);

#[derive(Clone, PartialEq, Eq, Hash, Copy, PartialOrd, Ord, Debug)]
pub(crate) struct ProdId(pub(crate) u32);

pub(crate) const END_OF_INPUT: TermId = TermId(0);
pub(crate) const START: NontermId = NontermId(0);
pub(crate) const START_PROD: ProdId = ProdId(0);

#[derive(Clone, Default)]
pub(crate) struct Nonterm {
  /// `None` for the augmented start.
  pub(crate) rule: Option<RuleId>,
  /// non-empty
  pub(crate) prods: Vec<ProdId>,
}

#[derive(Clone)]
pub(crate) struct Production {
  pub(crate) nonterm_id: NontermId,
  /// Rule the symbols come from.
  pub(crate) rule: Option<RuleId>,
  /// In parse order, `Empty` left out.
  pub(crate) symbols: Vec<Symbol>,
  /// Symbols were reversed for a reverse parse.
  pub(crate) reversible: bool,
}

impl Bnf {
  pub(crate) fn new(ri: &RuleIndex, start: RuleId, reverse: bool) -> Result<Bnf, Error> {
    let mut bnf = Bnf {
      terms: IndexMap::new(),
      nonterm_ids: HashMap::new(),
      nonterms: vec![Nonterm::default()],
      prods: vec![],
      reverse,
    };
    bnf.terms.insert(ri.end_of_input, END_OF_INPUT);

    let mut queue = VecDeque::new();
    let start_sym = bnf.gen_sym(ri, &mut queue, ri.find(start))?;
    let start_sym = start_sym.ok_or_else(|| {
      Error::StartRule(format!("start rule matches nothing: {}", ri.id_str(start)))
    })?;
    bnf.add_prod(START, None, vec![start_sym], false);

    while let Some(rule) = queue.pop_front() {
      let id = bnf.nonterm_ids[&rule];
      bnf.gen_nonterm(ri, &mut queue, id, rule)?;
    }
    Ok(bnf)
  }

  pub(crate) fn num_terms(&self) -> usize {
    self.terms.len()
  }

  pub(crate) fn term_rule(&self, id: TermId) -> RuleId {
    *self.terms.get_index(id.0 as usize)
      .expect("term id out of range")
      .0
  }

  pub(crate) fn nonterm_id(&self, rule: RuleId) -> Option<NontermId> {
    self.nonterm_ids.get(&rule).copied()
  }

  fn add_prod(
    &mut self,
    nonterm_id: NontermId,
    rule: Option<RuleId>,
    symbols: Vec<Symbol>,
    reversible: bool,
  ) {
    let id = ProdId(self.prods.len() as u32);
    self.prods.push(Production {
      nonterm_id,
      rule,
      symbols,
      reversible,
    });
    self.nonterms[nonterm_id.0 as usize].prods.push(id);
  }

  fn gen_nonterm(
    &mut self,
    ri: &RuleIndex,
    queue: &mut VecDeque<RuleId>,
    id: NontermId,
    rule: RuleId,
  ) -> Result<(), Error> {
    let (alts, reversible) = match ri.get(rule) {
      Rule::Definition(d) => {
        let prod = ri.find(d.prod);
        match ri.get(prod) {
          Rule::Alternation(v) => (v.clone(), !d.no_reverse),
          _ => (vec![prod], !d.no_reverse),
        }
      }
      Rule::Alternation(v) => (v.clone(), true),
      Rule::Sequence(_) => (vec![rule], true),
      r => unreachable!("not a nonterminal: {:?}", r),
    };
    for alt in alts {
      let prod = self.gen_prod(ri, queue, ri.find(alt), reversible)?;
      self.add_prod(id, Some(ri.find(alt)), prod, reversible);
    }
    Ok(())
  }

  fn gen_prod(
    &mut self,
    ri: &RuleIndex,
    queue: &mut VecDeque<RuleId>,
    rule: RuleId,
    reversible: bool,
  ) -> Result<Vec<Symbol>, Error> {
    let items = match ri.get(rule) {
      Rule::Sequence(v) => v.clone(),
      _ => vec![rule],
    };
    let mut symbols = Vec::with_capacity(items.len());
    for item in items {
      if let Some(sym) = self.gen_sym(ri, queue, ri.find(item))? {
        symbols.push(sym);
      }
    }
    if self.reverse && reversible {
      symbols.reverse();
    }
    Ok(symbols)
  }

  fn gen_sym(
    &mut self,
    ri: &RuleIndex,
    queue: &mut VecDeque<RuleId>,
    rule: RuleId,
  ) -> Result<Option<Symbol>, Error> {
    match ri.get(rule) {
      Rule::Empty => Ok(None),
      Rule::Literal(_) | Rule::Function(_) | Rule::EndOfInput => {
        let next = TermId(self.terms.len() as u32);
        Ok(Some(Symbol::Term(*self.terms.entry(rule).or_insert(next))))
      }
      Rule::Definition(_) | Rule::Alternation(_) | Rule::Sequence(_) => {
        if let Some(&id) = self.nonterm_ids.get(&rule) {
          return Ok(Some(Symbol::Nonterm(id)));
        }
        let id = NontermId(self.nonterms.len() as u32);
        self.nonterms.push(Nonterm {
          rule: Some(rule),
          prods: vec![],
        });
        self.nonterm_ids.insert(rule, id);
        queue.push_back(rule);
        Ok(Some(Symbol::Nonterm(id)))
      }
      Rule::BooleanFlag(b) => {
        Err(Error::UnknownRule(format!("boolean flag used as a rule: {}", b.name)))
      }
      r => panic!("rule survived dereference: {:?}", r),
    }
  }

  pub(crate) fn sym_name(&self, ri: &RuleIndex, sym: Symbol) -> String {
    match sym {
      Symbol::Term(t) => ri.id_str(self.term_rule(t)),
      Symbol::Nonterm(n) => self.nonterm_name(ri, n),
    }
  }

  pub(crate) fn nonterm_name(&self, ri: &RuleIndex, id: NontermId) -> String {
    match self.nonterms[id.0 as usize].rule {
      Some(rule) => ri.id_str(rule),
      None => "^".to_owned(),
    }
  }

  /// `name -> a b c`, with an optional dot position.
  pub(crate) fn prod_str(&self, ri: &RuleIndex, prod: ProdId, dot: Option<usize>) -> String {
    let p = &self.prods[prod.0 as usize];
    let mut out = format!("{} ->", self.nonterm_name(ri, p.nonterm_id));
    for (i, &sym) in p.symbols.iter().enumerate() {
      if dot == Some(i) {
        out.push_str(" .");
      }
      out.push(' ');
      out.push_str(&self.sym_name(ri, sym));
    }
    if dot == Some(p.symbols.len()) {
      out.push_str(" .");
    }
    out
  }
}
