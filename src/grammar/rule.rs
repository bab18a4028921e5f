use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use crate::runeset::RuneSet;
use crate::scanner::Scanner;

/// Index of a rule in the rule arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct RuleId(pub(crate) u32);

impl RuleId {
  pub(crate) fn index(self) -> usize {
    self.0 as usize
  }
}

#[derive(Debug, Clone)]
pub enum Rule {
  /// Named production.
  Definition(Definition),
  /// Name lookup, gone after dereference.
  Reference(Reference),
  Sequence(Vec<RuleId>),
  Alternation(Vec<RuleId>),
  /// Compile-time `if flag ? a : b`, gone after dereference.
  Conditional(Conditional),
  BooleanFlag(BooleanFlag),
  /// Parenthesised expression, gone after dereference.
  Group(Group),
  Literal(Literal),
  /// Compile-time call, gone after dereference.
  Procedure(Procedure),
  Function(Function),
  EndOfInput,
  Empty,
}

#[derive(Debug, Clone)]
pub struct Definition {
  pub name: String,
  pub prod: RuleId,
  pub start: bool,
  pub no_print: bool,
  /// Sequences keep their order when parsing in reverse.
  pub no_reverse: bool,
  /// Set on definitions synthesized from repetition groups.
  pub repeat: Option<Repeat>,
  /// Grammar offset of the name or group, 0 when registered by the host.
  pub pos: usize,
}

impl Definition {
  pub(crate) fn new(name: impl Into<String>, prod: RuleId) -> Self {
    Definition {
      name: name.into(),
      prod,
      start: false,
      no_print: false,
      no_reverse: false,
      repeat: None,
      pos: 0,
    }
  }
}

#[derive(Debug, Clone)]
pub struct Reference {
  pub name: String,
  pub pos: usize,
}

#[derive(Debug, Clone)]
pub struct Conditional {
  pub flag: RuleId,
  pub then: RuleId,
  pub otherwise: RuleId,
  pub pos: usize,
}

#[derive(Debug, Clone)]
pub struct BooleanFlag {
  pub name: String,
  pub value: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Repeat {
  Optional,
  ZeroOrMore,
  OneOrMore,
}

impl Repeat {
  pub fn op(self) -> char {
    match self {
      Repeat::Optional => '?',
      Repeat::ZeroOrMore => '*',
      Repeat::OneOrMore => '+',
    }
  }
}

#[derive(Debug, Clone)]
pub struct Group {
  pub child: RuleId,
  pub repeat: Option<Repeat>,
  pub pos: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralKind {
  Sequence,
  /// Sequence that may start before the cursor.
  SequenceMid,
  AnyOf,
  NoneOf,
}

impl LiteralKind {
  pub fn is_sequence(self) -> bool {
    matches!(self, LiteralKind::Sequence | LiteralKind::SequenceMid)
  }

  pub(crate) fn op(self) -> &'static str {
    match self {
      LiteralKind::Sequence => "",
      LiteralKind::SequenceMid => "~",
      LiteralKind::AnyOf => "%",
      LiteralKind::NoneOf => "!",
    }
  }
}

#[derive(Debug, Clone)]
pub struct Literal {
  pub kind: LiteralKind,
  /// Sequence kinds.
  pub runes: Vec<char>,
  /// Any-of and none-of kinds.
  pub set: RuneSet,
  /// Literal still waiting to absorb a named literal.
  pub(crate) reference: Option<RuleId>,
  pub pos: usize,
}

impl Literal {
  pub fn sequence(runes: impl IntoIterator<Item = char>) -> Self {
    Literal {
      kind: LiteralKind::Sequence,
      runes: runes.into_iter().collect(),
      set: RuneSet::new(),
      reference: None,
      pos: 0,
    }
  }

  pub fn set(kind: LiteralKind, set: RuneSet) -> Self {
    Literal {
      kind,
      runes: Vec::new(),
      set,
      reference: None,
      pos: 0,
    }
  }

  /// Changes the kind of a fully known literal.
  pub(crate) fn with_kind(mut self, kind: LiteralKind) -> Self {
    if kind.is_sequence() == self.kind.is_sequence() {
      self.kind = kind;
      return self;
    }
    if !kind.is_sequence() {
      self.set = RuneSet::from_runes(self.runes.drain(..));
    }
    self.kind = kind;
    self
  }

  pub(crate) fn matches(&self, scanner: &mut Scanner) -> bool {
    match self.kind {
      LiteralKind::Sequence => scanner.sequence(&self.runes),
      LiteralKind::SequenceMid => scanner.sequence_mid(&self.runes),
      LiteralKind::AnyOf => scanner.any_of(&self.set),
      LiteralKind::NoneOf => scanner.none_of(&self.set),
    }
  }

  /// Runes this literal can start with in the given direction. `None` when
  /// the coverage is a complement.
  pub(crate) fn coverage(&self, reverse: bool) -> Option<RuneSet> {
    match self.kind {
      LiteralKind::Sequence | LiteralKind::SequenceMid => {
        let first = if reverse { self.runes.last() } else { self.runes.first() };
        Some(first.map_or_else(RuneSet::new, |&c| RuneSet::from_runes(Some(c))))
      }
      LiteralKind::AnyOf => Some(self.set.clone()),
      LiteralKind::NoneOf => None,
    }
  }

  pub(crate) fn id_str(&self) -> String {
    let body = if self.kind.is_sequence() {
      format!("{:?}", self.runes.iter().collect::<String>())
    } else {
      format!("[{}]", self.set)
    };
    format!("{}{}", body, self.kind.op())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcArg {
  Rule(RuleId),
  Int(i64),
}

#[derive(Debug, Clone)]
pub struct Procedure {
  pub name: String,
  pub args: Vec<ProcArg>,
  pub pos: usize,
}

pub type MatchFn = dyn Fn(&mut Scanner) -> bool + Send + Sync;

/// Terminal backed by a host scanning routine.
#[derive(Clone)]
pub struct Function {
  pub name: String,
  /// Lower values are tried first.
  pub priority: i32,
  pub matcher: Arc<MatchFn>,
}

impl Debug for Function {
  fn fmt(&self, f: &mut Formatter) -> fmt::Result {
    f.debug_struct("Function")
      .field("name", &self.name)
      .field("priority", &self.priority)
      .finish()
  }
}

impl Rule {
  pub fn is_terminal(&self) -> bool {
    matches!(self, Rule::Literal(_) | Rule::Function(_) | Rule::EndOfInput)
  }

  /// Variants that must not survive dereference.
  pub fn is_unresolved(&self) -> bool {
    matches!(self,
      Rule::Reference(_) | Rule::Group(_) | Rule::Conditional(_)
      | Rule::Procedure(_))
      || matches!(self, Rule::Literal(l) if l.reference.is_some())
  }

  pub(crate) fn children(&self) -> Vec<RuleId> {
    match self {
      Rule::Definition(d) => vec![d.prod],
      Rule::Sequence(v) | Rule::Alternation(v) => v.clone(),
      Rule::Conditional(c) => vec![c.flag, c.then, c.otherwise],
      Rule::Group(g) => vec![g.child],
      Rule::Literal(l) => l.reference.into_iter().collect(),
      Rule::Procedure(p) => p.args.iter()
        .filter_map(|a| match a {
          ProcArg::Rule(id) => Some(*id),
          ProcArg::Int(_) => None,
        })
        .collect(),
      Rule::Reference(_) | Rule::BooleanFlag(_) | Rule::Function(_)
      | Rule::EndOfInput | Rule::Empty => vec![],
    }
  }

  pub(crate) fn children_mut(&mut self) -> Vec<&mut RuleId> {
    match self {
      Rule::Definition(d) => vec![&mut d.prod],
      Rule::Sequence(v) | Rule::Alternation(v) => v.iter_mut().collect(),
      Rule::Conditional(c) => vec![&mut c.flag, &mut c.then, &mut c.otherwise],
      Rule::Group(g) => vec![&mut g.child],
      Rule::Literal(l) => l.reference.iter_mut().collect(),
      Rule::Procedure(p) => p.args.iter_mut()
        .filter_map(|a| match a {
          ProcArg::Rule(id) => Some(id),
          ProcArg::Int(_) => None,
        })
        .collect(),
      Rule::Reference(_) | Rule::BooleanFlag(_) | Rule::Function(_)
      | Rule::EndOfInput | Rule::Empty => vec![],
    }
  }
}
