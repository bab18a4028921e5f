use std::collections::HashMap;
use log::{debug, trace};
use crate::bnf::*;
use crate::error::{Error, Location};
use crate::grammar::{Repeat, Rule, RuleId};
use crate::scanner::Scanner;
use super::node::{CpNode, NodeView};
use super::table::{describe_action, Action};
use super::ContentParser;

/// Fabricated lookaheads allowed per state before an early stop gives up.
const MAX_RETRIES: usize = 20;

struct Frame {
  state: usize,
  /// `None` only at the bottom of the stack.
  node: Option<CpNode>,
}

/// One content parse over a source buffer.
pub(super) struct Run<'a> {
  cp: &'a ContentParser,
  src: &'a [u8],
  sc: Scanner<'a>,
  stack: Vec<Frame>,
  retries: HashMap<usize, usize>,
  /// First failure of an early stop, reported if nothing can be accepted.
  deferred: Option<Error>,
}

impl<'a> Run<'a> {
  pub(super) fn new(cp: &'a ContentParser, src: &'a [u8], index: usize) -> Self {
    Run {
      cp,
      src,
      sc: Scanner::new(src, index, cp.opts.reverse),
      stack: vec![Frame {
        state: 0,
        node: None,
      }],
      retries: HashMap::new(),
      deferred: None,
    }
  }

  pub(super) fn run(mut self) -> Result<CpNode, Error> {
    let cp = self.cp;
    let mut lookahead: Option<(TermId, CpNode)> = None;

    loop {
      let state = self.top();
      let (term, node) = match lookahead.take() {
        Some(la) => la,
        None => self.next_token(state)?,
      };

      match cp.table.states[state].actions.get(&term).copied() {
        Some(Action::Shift(next)) => {
          trace!("state {}: shift {} at {}, goto {}",
            state, cp.ri.id_str(node.rule), node.pos, next);
          let mut node = node;
          if !node.simulated {
            self.callback(&mut node)?;
          }
          self.stack.push(Frame {
            state: next,
            node: Some(node),
          });
        }
        Some(Action::Reduce(prod)) => {
          trace!("state {}: {}", state, describe_action(&cp.ri, &cp.bnf, Action::Reduce(prod)));
          let reduced = self.reduce(prod, &node)?;
          let nonterm = cp.bnf.prods[prod.0 as usize].nonterm_id;
          let next = cp.table.states[self.top()].gotos.get(&nonterm)
            .copied()
            .expect("goto exists for every reduced nonterminal");
          self.stack.push(Frame {
            state: next,
            node: Some(reduced),
          });
          lookahead = Some((term, node));
        }
        Some(Action::Accept) => {
          trace!("state {}: accept", state);
          return self.accept();
        }
        None => {
          let err = self.no_match(state);
          return Err(self.deferred.take().unwrap_or(err));
        }
      }
    }
  }

  fn top(&self) -> usize {
    self.stack.last().map_or(0, |f| f.state)
  }

  /// Reads the lookahead, trying the state's candidates in order.
  fn next_token(&mut self, state: usize) -> Result<(TermId, CpNode), Error> {
    let cp = self.cp;
    let st = &cp.table.states[state];
    let start = self.sc.pos();

    for &term in &st.candidates {
      let rule = cp.bnf.term_rule(term);
      if self.match_term(rule) {
        return Ok((term, CpNode::new(start, self.sc.pos(), rule)));
      }
      self.sc.set_pos(start);
    }

    let err = self.no_match(state);
    if !cp.opts.early_stop {
      return Err(err);
    }
    if self.deferred.is_none() {
      debug!("early stop at {}: {}", start, err);
      self.deferred = Some(err);
    }

    let fabricated = if st.actions.contains_key(&END_OF_INPUT) {
      Some(END_OF_INPUT)
    } else {
      let count = self.retries.entry(state).or_insert(0);
      *count += 1;
      if *count > MAX_RETRIES || st.candidates.is_empty() {
        None
      } else {
        Some(st.candidates[(*count - 1) % st.candidates.len()])
      }
    };

    match fabricated {
      Some(term) => {
        trace!("state {}: simulating {}", state, cp.bnf.sym_name(&cp.ri, Symbol::Term(term)));
        let mut node = CpNode::new(start, start, cp.bnf.term_rule(term));
        node.simulated = true;
        Ok((term, node))
      }
      None => Err(self.deferred.take().unwrap_or_else(|| self.no_match(state))),
    }
  }

  fn match_term(&mut self, rule: RuleId) -> bool {
    match self.cp.ri.get(rule) {
      Rule::Literal(l) => l.matches(&mut self.sc),
      Rule::Function(f) => (f.matcher)(&mut self.sc),
      Rule::EndOfInput => self.sc.is_end(),
      r => unreachable!("not a terminal: {:?}", r),
    }
  }

  fn reduce(&mut self, prod: ProdId, lookahead: &CpNode) -> Result<CpNode, Error> {
    let cp = self.cp;
    let p = &cp.bnf.prods[prod.0 as usize];
    let rule = cp.bnf.nonterms[p.nonterm_id.0 as usize].rule
      .expect("augmented start is accepted, never reduced");

    let at = self.stack.len() - p.symbols.len();
    let children: Vec<CpNode> = self.stack.drain(at..)
      .filter_map(|f| f.node)
      .collect();

    let mut node = match (children.first(), children.last()) {
      (Some(first), Some(last)) => CpNode::new(first.pos, last.end, rule),
      _ => CpNode::new(lookahead.pos, lookahead.pos, rule),
    };
    node.alt = p.rule;
    node.children = children;

    if node.children.iter().any(|c| c.simulated) {
      self.recover(&mut node);
    }
    if cp.bnf.reverse && p.reversible {
      node.children.reverse();
    }
    if !node.simulated {
      self.callback(&mut node)?;
    }
    Ok(node)
  }

  /// Drops what simulated lookaheads added to a node, keeping the part of a
  /// repetition that matched real input.
  fn recover(&self, node: &mut CpNode) {
    let ri = &self.cp.ri;
    let repeat = match ri.get(node.rule) {
      Rule::Definition(d) => d.repeat,
      _ => None,
    };

    match repeat {
      Some(Repeat::Optional) => {
        node.children.clear();
        node.end = node.pos;
      }
      Some(Repeat::ZeroOrMore) => {
        let rule = node.rule;
        let inner = node.children.iter()
          .position(|c| c.rule == rule && !c.simulated);
        match inner {
          Some(i) => {
            let inner = node.children.swap_remove(i);
            *node = inner;
          }
          None => {
            node.children.clear();
            node.end = node.pos;
          }
        }
      }
      Some(Repeat::OneOrMore) => {
        let inner = node.children.iter().position(|c| {
          !c.simulated && !c.children.is_empty() && matches!(
            ri.get(c.rule),
            Rule::Definition(d) if d.repeat == Some(Repeat::ZeroOrMore)
          )
        });
        match inner {
          Some(i) => {
            let inner = node.children.swap_remove(i);
            node.children = inner.children;
            node.pos = node.children.first().map_or(node.pos, |c| c.pos);
            node.end = node.children.last().map_or(node.pos, |c| c.end);
          }
          None => simulate(node),
        }
      }
      None => simulate(node),
    }
  }

  fn callback(&self, node: &mut CpNode) -> Result<(), Error> {
    let cp = self.cp;
    let f = match cp.callbacks.get(&node.rule) {
      Some(f) => f,
      None => return Ok(()),
    };
    let result = {
      let mut view = NodeView::new(node, self.src, &cp.ri);
      f(&mut view)
    };
    result.map_err(|source| Error::Callback {
      location: Location::resolve(None, self.src, node.span().start),
      rule: cp.ri.id_str(node.rule),
      source,
    })
  }

  fn accept(mut self) -> Result<CpNode, Error> {
    match self.stack.pop().and_then(|f| f.node) {
      Some(mut root) if !root.simulated => {
        root.normalize();
        debug!("accepted {} over {:?}", self.cp.ri.id_str(root.rule), root.span());
        Ok(root)
      }
      _ => {
        let pos = self.sc.pos();
        Err(self.deferred.take()
          .unwrap_or_else(|| Error::parse(self.src, pos, "nothing matched")))
      }
    }
  }

  fn no_match(&self, state: usize) -> Error {
    let cp = self.cp;
    let mut message = match self.sc.peek_rune() {
      Some((c, _)) => format!("unexpected {:?}", c),
      None => "unexpected end of input".to_owned(),
    };
    if cp.opts.verbose {
      let expected = cp.table.states[state].candidates.iter()
        .map(|&t| cp.bnf.sym_name(&cp.ri, Symbol::Term(t)))
        .collect::<Vec<_>>()
        .join(", ");
      let states = self.stack.iter()
        .map(|f| f.state.to_string())
        .collect::<Vec<_>>()
        .join(" ");
      message.push_str(&format!("; expecting one of {}; state stack [{}]", expected, states));
    }
    Error::parse(self.src, self.sc.pos(), message)
  }
}

fn simulate(node: &mut CpNode) {
  node.simulated = true;
  node.children.clear();
  node.end = node.pos;
}
