use std::any::Any;
use std::borrow::Cow;
use std::fmt::{self, Debug, Formatter};
use std::ops::Range;
use crate::error::CallbackError;
use crate::grammar::{Rule, RuleId, RuleIndex};

/// Node of a content parse tree.
///
/// While parsing in reverse, `pos` is the right edge and `end` the left one;
/// accepted trees are normalized so that `pos <= end`.
pub struct CpNode {
  pub(crate) pos: usize,
  pub(crate) end: usize,
  pub(crate) rule: RuleId,
  /// Alternative of `rule` this node was reduced from.
  pub(crate) alt: Option<RuleId>,
  pub(crate) children: Vec<CpNode>,
  pub(crate) data: Option<Box<dyn Any + Send + Sync>>,
  /// Stands for input that was never read, during early stop.
  pub(crate) simulated: bool,
}

impl CpNode {
  pub(crate) fn new(pos: usize, end: usize, rule: RuleId) -> Self {
    CpNode {
      pos,
      end,
      rule,
      alt: None,
      children: vec![],
      data: None,
      simulated: false,
    }
  }

  pub fn span(&self) -> Range<usize> {
    self.pos.min(self.end)..self.pos.max(self.end)
  }

  pub fn rule(&self) -> RuleId {
    self.rule
  }

  pub fn children(&self) -> &[CpNode] {
    &self.children
  }

  pub fn is_simulated(&self) -> bool {
    self.simulated
  }

  pub fn data<T: Any>(&self) -> Option<&T> {
    self.data.as_ref().and_then(|d| d.downcast_ref())
  }

  pub(crate) fn normalize(&mut self) {
    if self.pos > self.end {
      std::mem::swap(&mut self.pos, &mut self.end);
    }
    for child in &mut self.children {
      child.normalize();
    }
  }
}

impl Debug for CpNode {
  fn fmt(&self, f: &mut Formatter) -> fmt::Result {
    f.debug_struct("CpNode")
      .field("span", &self.span())
      .field("rule", &self.rule)
      .field("children", &self.children)
      .field("simulated", &self.simulated)
      .finish()
  }
}

/// Mutable handle on a node, handed to reduce callbacks.
pub struct NodeView<'a> {
  node: &'a mut CpNode,
  src: &'a [u8],
  ri: &'a RuleIndex,
}

impl<'a> NodeView<'a> {
  pub(crate) fn new(node: &'a mut CpNode, src: &'a [u8], ri: &'a RuleIndex) -> Self {
    NodeView {
      node,
      src,
      ri,
    }
  }

  pub fn name(&self) -> String {
    self.ri.id_str(self.node.rule)
  }

  pub fn node(&self) -> &CpNode {
    self.node
  }

  pub fn span(&self) -> Range<usize> {
    self.node.span()
  }

  pub fn bytes(&self) -> &[u8] {
    &self.src[self.span()]
  }

  pub fn text(&self) -> Cow<'_, str> {
    String::from_utf8_lossy(self.bytes())
  }

  pub fn is_empty(&self) -> bool {
    self.node.pos == self.node.end && self.node.children.is_empty()
  }

  pub fn child_count(&self) -> usize {
    self.node.children.len()
  }

  pub fn child(&mut self, i: usize) -> Option<NodeView<'_>> {
    let src = self.src;
    let ri = self.ri;
    self.node.children.get_mut(i).map(|node| NodeView::new(node, src, ri))
  }

  /// Like `child`, `None` also for a child that matched nothing.
  pub fn child_opt(&mut self, i: usize) -> Option<NodeView<'_>> {
    self.child(i).filter(|c| !c.is_empty())
  }

  pub fn child_text(&self, i: usize) -> Option<Cow<'_, str>> {
    self.node.children.get(i)
      .map(|c| String::from_utf8_lossy(&self.src[c.span()]))
  }

  pub fn child_int(&self, i: usize) -> Result<i64, CallbackError> {
    let text = self.child_text(i)
      .ok_or_else(|| format!("no child {}", i))?;
    Ok(text.trim().parse::<i64>()?)
  }

  /// Whether the node was reduced from the `n`th alternative of its rule.
  pub fn is_alternative(&self, n: usize) -> bool {
    let alts = match self.ri.get(self.node.rule) {
      Rule::Definition(d) => match self.ri.get(d.prod) {
        Rule::Alternation(v) => v.clone(),
        _ => return n == 0,
      },
      Rule::Alternation(v) => v.clone(),
      _ => return n == 0,
    };
    match (alts.get(n), self.node.alt) {
      (Some(&a), Some(alt)) => self.ri.find(a) == self.ri.find(alt),
      _ => false,
    }
  }

  pub fn data<T: Any>(&self) -> Option<&T> {
    self.node.data()
  }

  pub fn child_data<T: Any>(&self, i: usize) -> Option<&T> {
    self.node.children.get(i).and_then(|c| c.data())
  }

  pub fn set_data<T: Any + Send + Sync>(&mut self, data: T) {
    self.node.data = Some(Box::new(data));
  }

  pub fn take_data<T: Any>(&mut self) -> Option<T> {
    match self.node.data.take()?.downcast::<T>() {
      Ok(b) => Some(*b),
      Err(other) => {
        self.node.data = Some(other);
        None
      }
    }
  }

  pub fn dump(&self, max_depth: usize) -> String {
    let mut out = String::new();
    dump_node(&mut out, self.node, self.src, self.ri, 0, max_depth);
    out
  }
}

/// Owned result of a content parse.
pub struct ParseTree<'a> {
  root: CpNode,
  src: &'a [u8],
  ri: &'a RuleIndex,
}

impl<'a> ParseTree<'a> {
  pub(crate) fn new(root: CpNode, src: &'a [u8], ri: &'a RuleIndex) -> Self {
    ParseTree {
      root,
      src,
      ri,
    }
  }

  pub fn root(&self) -> &CpNode {
    &self.root
  }

  pub fn view(&mut self) -> NodeView<'_> {
    NodeView::new(&mut self.root, self.src, self.ri)
  }

  pub fn span(&self) -> Range<usize> {
    self.root.span()
  }

  pub fn text(&self) -> Cow<'a, str> {
    String::from_utf8_lossy(&self.src[self.span()])
  }

  /// Indented listing, one node per line, down to `max_depth` levels.
  pub fn dump(&self, max_depth: usize) -> String {
    let mut out = String::new();
    dump_node(&mut out, &self.root, self.src, self.ri, 0, max_depth);
    out
  }

  pub fn into_root(self) -> CpNode {
    self.root
  }
}

fn dump_node(
  out: &mut String,
  node: &CpNode,
  src: &[u8],
  ri: &RuleIndex,
  depth: usize,
  max_depth: usize,
) {
  if depth >= max_depth {
    return;
  }
  let hidden = matches!(ri.get(node.rule), Rule::Definition(d) if d.no_print);
  if hidden {
    for child in &node.children {
      dump_node(out, child, src, ri, depth, max_depth);
    }
    return;
  }

  let span = node.span();
  let text = src.get(span.clone())
    .map(String::from_utf8_lossy)
    .unwrap_or_default();
  out.push_str(&"  ".repeat(depth));
  out.push_str(&format!("{} {}-{} {:?}", ri.id_str(node.rule), span.start, span.end, text));
  if node.simulated {
    out.push_str(" simulated");
  }
  out.push('\n');
  for child in &node.children {
    dump_node(out, child, src, ri, depth + 1, max_depth);
  }
}
