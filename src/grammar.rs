//! Rule model and the rule index a grammar compiles into.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use indexmap::IndexMap;
use crate::error::{Error, Location};
use crate::scanner::Scanner;

mod builtin;
mod compile;
pub(crate) mod deref;
pub mod rule;

pub use rule::*;

pub type ProcedureFn =
  dyn Fn(&mut RuleIndex, &[ProcArg]) -> Result<RuleId, String> + Send + Sync;

struct Source {
  file: String,
  start: usize,
  text: String,
}

/// Arena of rules plus the names the grammar defines.
///
/// Rules refer to each other by `RuleId`. Rewriting passes never alias rules:
/// replacing a rule redirects its id to another one, and every lookup goes
/// through the redirect table.
pub struct RuleIndex {
  rules: Vec<Rule>,
  redirect: Vec<RuleId>,
  names: IndexMap<String, RuleId>,
  procedures: HashMap<String, Arc<ProcedureFn>>,
  sources: Vec<Source>,
  next_offset: usize,
  pub(crate) empty: RuleId,
  pub(crate) end_of_input: RuleId,
  dereferenced: bool,
}

impl RuleIndex {
  pub fn new() -> Self {
    let mut ri = RuleIndex {
      rules: vec![],
      redirect: vec![],
      names: IndexMap::new(),
      procedures: HashMap::new(),
      sources: vec![],
      // offset 0 belongs to no source
      next_offset: 1,
      empty: RuleId(0),
      end_of_input: RuleId(0),
      dereferenced: false,
    };
    ri.empty = ri.add(Rule::Empty);
    ri.end_of_input = ri.add(Rule::EndOfInput);
    builtin::register(&mut ri);
    ri
  }

  pub(crate) fn add(&mut self, rule: Rule) -> RuleId {
    let id = RuleId(self.rules.len() as u32);
    self.rules.push(rule);
    self.redirect.push(id);
    id
  }

  /// Follows redirects to the rule currently standing for `id`.
  pub fn find(&self, mut id: RuleId) -> RuleId {
    while self.redirect[id.index()] != id {
      id = self.redirect[id.index()];
    }
    id
  }

  pub(crate) fn redirect(&mut self, from: RuleId, to: RuleId) {
    let from = self.find(from);
    let to = self.find(to);
    if from != to {
      self.redirect[from.index()] = to;
    }
  }

  pub fn get(&self, id: RuleId) -> &Rule {
    &self.rules[self.find(id).index()]
  }

  pub(crate) fn get_mut(&mut self, id: RuleId) -> &mut Rule {
    let id = self.find(id);
    &mut self.rules[id.index()]
  }

  pub fn lookup(&self, name: &str) -> Option<RuleId> {
    self.names.get(name).map(|&id| self.find(id))
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.names.keys().map(|s| s.as_str())
  }

  pub(crate) fn roots(&self) -> Vec<RuleId> {
    self.names.values().map(|&id| self.find(id)).collect()
  }

  pub(crate) fn set_name(&mut self, name: impl Into<String>, id: RuleId) {
    self.names.insert(name.into(), id);
  }

  pub fn is_dereferenced(&self) -> bool {
    self.dereferenced
  }

  pub fn set_boolean_flag(&mut self, name: &str, value: bool) {
    let id = self.add(Rule::BooleanFlag(BooleanFlag {
      name: name.to_owned(),
      value,
    }));
    self.set_name(name, id);
  }

  /// Names a plain literal, usable in grammars as a reference.
  pub fn set_string_rule(&mut self, name: &str, value: &str) {
    let id = self.add(Rule::Literal(Literal::sequence(value.chars())));
    self.set_name(name, id);
  }

  pub fn set_function_rule<F>(&mut self, name: &str, priority: i32, matcher: F)
  where
    F: Fn(&mut Scanner) -> bool + Send + Sync + 'static,
  {
    let id = self.add_function(name, priority, Arc::new(matcher));
    self.set_name(name, id);
  }

  pub(crate) fn add_function(
    &mut self,
    name: &str,
    priority: i32,
    matcher: Arc<MatchFn>,
  ) -> RuleId {
    self.add(Rule::Function(Function {
      name: name.to_owned(),
      priority,
      matcher,
    }))
  }

  pub fn set_procedure_handler<F>(&mut self, name: &str, handler: F)
  where
    F: Fn(&mut RuleIndex, &[ProcArg]) -> Result<RuleId, String>
      + Send + Sync + 'static,
  {
    self.procedures.insert(name.to_owned(), Arc::new(handler));
  }

  pub(crate) fn procedure(&self, name: &str) -> Option<Arc<ProcedureFn>> {
    self.procedures.get(name).cloned()
  }

  /// Adds a literal rule, for procedure handlers.
  pub fn add_literal(&mut self, literal: Literal) -> RuleId {
    self.add(Rule::Literal(literal))
  }

  /// The literal behind `id`, looking through definitions.
  pub fn literal_of(&self, id: RuleId) -> Option<&Literal> {
    let mut id = self.find(id);
    let mut seen = HashSet::new();
    while seen.insert(id) {
      match self.get(id) {
        Rule::Literal(l) => return Some(l),
        Rule::Definition(d) => id = self.find(d.prod),
        _ => return None,
      }
    }
    None
  }

  pub(crate) fn add_source(&mut self, file: &str, text: &str) -> usize {
    let start = self.next_offset;
    self.next_offset += text.len() + 1;
    self.sources.push(Source {
      file: file.to_owned(),
      start,
      text: text.to_owned(),
    });
    start
  }

  /// Build error at a global grammar offset.
  pub(crate) fn error_at(&self, pos: usize, message: impl Into<String>) -> Error {
    Error::Syntax {
      location: self.location_at(pos),
      message: message.into(),
    }
  }

  pub(crate) fn location_at(&self, pos: usize) -> Location {
    let source = self.sources.iter()
      .rev()
      .find(|s| s.start <= pos && pos <= s.start + s.text.len());
    match source {
      Some(s) => Location::resolve(Some(&s.file), s.text.as_bytes(), pos - s.start),
      None => Location::resolve(Some("<host>"), b"", 0),
    }
  }

  /// Textual id; structurally equal rules share it.
  pub fn id_str(&self, id: RuleId) -> String {
    self.id_str_depth(id, 0)
  }

  fn id_str_depth(&self, id: RuleId, depth: usize) -> String {
    if depth > 64 {
      return "...".to_owned();
    }
    let sub = |id: RuleId| self.id_str_depth(id, depth + 1);
    let list = |v: &[RuleId], sep: &str| {
      v.iter().map(|&id| sub(id)).collect::<Vec<_>>().join(sep)
    };
    match self.get(id) {
      Rule::Definition(d) => d.name.clone(),
      Rule::Reference(r) => r.name.clone(),
      Rule::Sequence(v) => format!("({})", list(v, " ")),
      Rule::Alternation(v) => format!("({})", list(v, " | ")),
      Rule::Conditional(c) => {
        format!("if {} ? {} : {}", sub(c.flag), sub(c.then), sub(c.otherwise))
      }
      Rule::BooleanFlag(b) => b.name.clone(),
      Rule::Group(g) => {
        let op = g.repeat.map_or(String::new(), |r| r.op().to_string());
        format!("({}){}", sub(g.child), op)
      }
      Rule::Literal(l) => match l.reference {
        Some(r) => format!("({}){}", sub(r), l.kind.op()),
        None => l.id_str(),
      },
      Rule::Procedure(p) => {
        let args = p.args.iter()
          .map(|a| match a {
            ProcArg::Rule(id) => sub(*id),
            ProcArg::Int(i) => i.to_string(),
          })
          .collect::<Vec<_>>()
          .join(", ");
        format!("@{}({})", p.name, args)
      }
      Rule::Function(f) => f.name.clone(),
      Rule::EndOfInput => "$".to_owned(),
      Rule::Empty => "nil".to_owned(),
    }
  }

  /// Rules reachable from the named roots, each visited once.
  pub(crate) fn reachable(&self) -> Vec<RuleId> {
    let mut seen = HashSet::new();
    let mut out = vec![];
    let mut stack = self.roots();
    stack.reverse();
    while let Some(id) = stack.pop() {
      let id = self.find(id);
      if !seen.insert(id) {
        continue;
      }
      out.push(id);
      let mut children = self.get(id).children();
      children.reverse();
      stack.extend(children);
    }
    out
  }

  /// Rewrites every child id to its canonical id.
  pub(crate) fn compact(&mut self) {
    for i in 0..self.rules.len() {
      let mut rule = std::mem::replace(&mut self.rules[i], Rule::Empty);
      for child in rule.children_mut() {
        *child = self.find(*child);
      }
      self.rules[i] = rule;
    }
    let names = self.names.iter()
      .map(|(name, &id)| (name.clone(), self.find(id)))
      .collect();
    self.names = names;
  }

  /// Readable listing of the named rules.
  pub fn dump(&self) -> String {
    let mut out = String::new();
    for id in self.reachable() {
      if let Rule::Definition(d) = self.get(id) {
        if d.no_print {
          continue;
        }
        let mut prefix = String::new();
        if d.start {
          prefix.push('^');
        }
        out.push_str(&format!("{}{} = {};\n", prefix, d.name, self.id_str(d.prod)));
      }
    }
    out
  }

  pub(crate) fn mark_dereferenced(&mut self) {
    self.dereferenced = true;
  }
}

impl Default for RuleIndex {
  fn default() -> Self {
    Self::new()
  }
}
