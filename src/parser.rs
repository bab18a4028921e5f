//! LALR(1) content parsers over a dereferenced rule index.

use std::collections::HashMap;
use std::sync::Arc;
use log::debug;
use crate::bnf::*;
use crate::error::{CallbackError, Error};
use crate::grammar::deref::dereference;
use crate::grammar::{Rule, RuleId, RuleIndex};

mod bitset;
mod node;
mod run;
pub(crate) mod sets;
pub(crate) mod state;
pub(crate) mod table;
#[cfg(test)]
mod tests;

pub use node::{CpNode, NodeView, ParseTree};
use sets::FirstSets;
use table::{describe_action, Table};

pub type Callback = dyn Fn(&mut NodeView) -> Result<(), CallbackError> + Send + Sync;

/// Options of a content parser.
#[derive(Debug, Clone, Default)]
pub struct CpOptions {
  /// Defaults to the single definition marked `^`.
  pub start_rule: Option<String>,
  /// Accept the longest prefix that parses instead of failing.
  pub early_stop: bool,
  /// Resolve shift/reduce conflicts by shifting.
  pub shift_on_conflict: bool,
  /// Parse right to left from the start index.
  pub reverse: bool,
  /// Add candidates and the state stack to parse errors.
  pub verbose: bool,
}

impl CpOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn start_rule(mut self, name: &str) -> Self {
    self.start_rule = Some(name.to_owned());
    self
  }

  pub fn early_stop(mut self, value: bool) -> Self {
    self.early_stop = value;
    self
  }

  pub fn shift_on_conflict(mut self, value: bool) -> Self {
    self.shift_on_conflict = value;
    self
  }

  pub fn reverse(mut self, value: bool) -> Self {
    self.reverse = value;
    self
  }

  pub fn verbose(mut self, value: bool) -> Self {
    self.verbose = value;
    self
  }
}

/// A dereferenced rule index, ready to build content parsers from.
pub struct LrParser {
  ri: Arc<RuleIndex>,
}

impl LrParser {
  pub(crate) fn new(mut ri: RuleIndex) -> Result<Self, Error> {
    if !ri.is_dereferenced() {
      dereference(&mut ri)?;
    }
    Ok(LrParser {
      ri: Arc::new(ri),
    })
  }

  pub fn rule_index(&self) -> &RuleIndex {
    &self.ri
  }

  /// Names of all rules, sorted.
  pub fn rule_names(&self) -> Vec<String> {
    let mut names: Vec<String> = self.ri.names().map(str::to_owned).collect();
    names.sort();
    names
  }

  pub fn dump_rules(&self) -> String {
    self.ri.dump()
  }

  /// Terminals that can start `name` in the given direction, sorted, with
  /// `nil` when it can match nothing.
  pub fn first_set(&self, name: &str, reverse: bool) -> Result<Vec<String>, Error> {
    let ri = &*self.ri;
    let rule = ri.lookup(name).ok_or_else(|| Error::UnknownRule(name.to_owned()))?;
    match ri.get(rule) {
      r if r.is_terminal() => return Ok(vec![ri.id_str(rule)]),
      Rule::Empty => return Ok(vec!["nil".to_owned()]),
      _ => {}
    }

    let bnf = Bnf::new(ri, rule, reverse)?;
    let sets = FirstSets::new(&bnf);
    let id = bnf.nonterm_id(rule).ok_or_else(|| Error::UnknownRule(name.to_owned()))?;
    let mut out: Vec<String> = sets.first[id.0 as usize].iter()
      .map(|t| bnf.sym_name(ri, Symbol::Term(TermId(t as u32))))
      .collect();
    out.sort();
    if sets.nullable[id.0 as usize] {
      out.push("nil".to_owned());
    }
    Ok(out)
  }

  pub fn content_parser(&self, opts: CpOptions) -> Result<ContentParser, Error> {
    let start = self.start_rule(&opts)?;
    let bnf = Bnf::new(&self.ri, start, opts.reverse)?;
    let sets = FirstSets::new(&bnf);
    let vertices = state::gen_vertices(&bnf, &sets);
    let table = table::gen_table(&self.ri, &bnf, &vertices, opts.shift_on_conflict)?;
    debug!("content parser for {}: {} terminals, {} productions, {} states",
      self.ri.id_str(start), bnf.num_terms(), bnf.prods.len(), table.states.len());

    Ok(ContentParser {
      ri: self.ri.clone(),
      bnf,
      table,
      opts,
      vertices,
      callbacks: HashMap::new(),
    })
  }

  fn start_rule(&self, opts: &CpOptions) -> Result<RuleId, Error> {
    let ri = &*self.ri;
    let start = match &opts.start_rule {
      Some(name) => ri.lookup(name).ok_or_else(|| Error::UnknownRule(name.clone()))?,
      None => {
        let marked: Vec<RuleId> = ri.reachable()
          .into_iter()
          .filter(|&id| matches!(ri.get(id), Rule::Definition(d) if d.start))
          .collect();
        match marked.as_slice() {
          [] => return Err(Error::StartRule("no rule marked as start".to_owned())),
          [id] => *id,
          _ => {
            let names = marked.iter()
              .map(|&id| ri.id_str(id))
              .collect::<Vec<_>>()
              .join(", ");
            return Err(Error::StartRule(format!("several rules marked as start: {}", names)));
          }
        }
      }
    };
    match ri.get(start) {
      Rule::Definition(_) => Ok(start),
      _ => Err(Error::StartRule(format!("not a definition: {}", ri.id_str(start)))),
    }
  }
}

/// Table-driven parser for one start rule and direction.
pub struct ContentParser {
  ri: Arc<RuleIndex>,
  bnf: Bnf,
  table: Table,
  opts: CpOptions,
  vertices: state::Vertices,
  callbacks: HashMap<RuleId, Arc<Callback>>,
}

impl ContentParser {
  pub fn options(&self) -> &CpOptions {
    &self.opts
  }

  pub fn rule_index(&self) -> &RuleIndex {
    &self.ri
  }

  /// Runs `f` on every node of rule `name` once it is complete.
  pub fn on_reduce<F>(&mut self, name: &str, f: F) -> Result<(), Error>
  where
    F: Fn(&mut NodeView) -> Result<(), CallbackError> + Send + Sync + 'static,
  {
    let rule = self.ri.lookup(name)
      .ok_or_else(|| Error::UnknownRule(name.to_owned()))?;
    self.callbacks.insert(rule, Arc::new(f));
    Ok(())
  }

  /// Parses `src` from byte `index`, forward or backward per the options.
  pub fn parse<'a>(&'a self, src: &'a [u8], index: usize) -> Result<ParseTree<'a>, Error> {
    let root = run::Run::new(self, src, index).run()?;
    Ok(ParseTree::new(root, src, &self.ri))
  }

  /// States with their items, lookaheads and actions.
  pub fn dump_states(&self) -> String {
    let ri = &*self.ri;
    let bnf = &self.bnf;
    let mut out = String::new();
    for (ix, (vertex, state)) in self.vertices.vertices.values()
      .zip(&self.table.states)
      .enumerate()
    {
      out.push_str(&format!("state {}\n", ix));
      for (item, la) in &vertex.items {
        let la = la.iter()
          .map(|t| bnf.sym_name(ri, Symbol::Term(TermId(t as u32))))
          .collect::<Vec<_>>()
          .join(" ");
        out.push_str(&format!("  {}  [{}]\n",
          bnf.prod_str(ri, item.prod, Some(item.dot as usize)), la));
      }
      for &term in &state.candidates {
        out.push_str(&format!("  {} => {}\n",
          bnf.sym_name(ri, Symbol::Term(term)),
          describe_action(ri, bnf, state.actions[&term])));
      }
      for (&nonterm, &target) in &state.gotos {
        out.push_str(&format!("  {} => goto {}\n", bnf.nonterm_name(ri, nonterm), target));
      }
    }
    out
  }
}
