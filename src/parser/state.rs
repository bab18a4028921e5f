use std::collections::{BTreeMap, HashSet, VecDeque};
use indexmap::IndexMap;
use crate::bnf::*;
use super::bitset::BitSet;
use super::sets::FirstSets;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub(crate) struct Lr0Item {
  pub(crate) prod: ProdId,
  pub(crate) dot: u16,
}

pub(crate) struct Vertex {
  /// kernel item -> lookaheads
  pub(crate) kernel: IndexMap<Lr0Item, BitSet>,
  /// kernel plus closure items, filled in when the vertex is expanded
  pub(crate) items: IndexMap<Lr0Item, BitSet>,
  /// symbol -> index of target vertex
  pub(crate) transitions: IndexMap<Symbol, usize>,
}

/// LR(0) kernel items, sorted.
type VertexKey = Vec<Lr0Item>;

pub(crate) struct Vertices {
  pub(crate) vertices: IndexMap<VertexKey, Vertex>,
}

impl Lr0Item {
  fn next_symbol(self, bnf: &Bnf) -> Option<Symbol> {
    bnf.prods[self.prod.0 as usize].symbols.get(self.dot as usize).copied()
  }

  pub(crate) fn is_complete(self, bnf: &Bnf) -> bool {
    self.next_symbol(bnf).is_none()
  }
}

/// Builds the LALR(1) automaton from the augmented start.
///
/// Vertices are keyed by their LR(0) kernel. Reaching a known kernel merges
/// lookaheads into it; a vertex whose lookaheads grew is expanded again until
/// nothing changes.
pub(crate) fn gen_vertices(
  bnf: &Bnf,
  sets: &FirstSets,
) -> Vertices {
  let num_terms = bnf.num_terms();
  let mut vertices: IndexMap<VertexKey, Vertex> = IndexMap::new();

  let start = Lr0Item {
    prod: START_PROD,
    dot: 0,
  };
  let mut kernel = IndexMap::new();
  kernel.insert(start, BitSet::from_bit(num_terms, END_OF_INPUT.0 as usize));
  vertices.insert(vec![start], Vertex {
    kernel,
    items: IndexMap::new(),
    transitions: IndexMap::new(),
  });

  let mut queue = VecDeque::from(vec![0]);
  let mut queued: HashSet<usize> = Some(0).into_iter().collect();

  while let Some(ix) = queue.pop_front() {
    queued.remove(&ix);
    let items = closure(bnf, sets, &vertices[ix].kernel);

    let mut gotos: BTreeMap<Symbol, IndexMap<Lr0Item, BitSet>> = BTreeMap::new();
    for (item, la) in &items {
      if let Some(sym) = item.next_symbol(bnf) {
        let next = Lr0Item {
          prod: item.prod,
          dot: item.dot + 1,
        };
        gotos.entry(sym)
          .or_default()
          .entry(next)
          .or_insert_with(|| BitSet::new(num_terms))
          .union_with(la);
      }
    }

    let mut transitions = IndexMap::new();
    for (sym, kernel) in gotos {
      let mut key: VertexKey = kernel.keys().copied().collect();
      key.sort();

      let target = match vertices.get_index_of(&key) {
        Some(target) => {
          let vertex = &mut vertices[target];
          let mut changed = false;
          for (item, la) in &kernel {
            if let Some(old) = vertex.kernel.get_mut(item) {
              changed |= old.union_with(la);
            }
          }
          if changed && queued.insert(target) {
            queue.push_back(target);
          }
          target
        }
        None => {
          let (target, _) = vertices.insert_full(key, Vertex {
            kernel,
            items: IndexMap::new(),
            transitions: IndexMap::new(),
          });
          queued.insert(target);
          queue.push_back(target);
          target
        }
      };
      transitions.insert(sym, target);
    }

    let vertex = &mut vertices[ix];
    vertex.items = items;
    vertex.transitions = transitions;
  }

  Vertices {
    vertices,
  }
}

fn closure(
  bnf: &Bnf,
  sets: &FirstSets,
  kernel: &IndexMap<Lr0Item, BitSet>,
) -> IndexMap<Lr0Item, BitSet> {
  let mut items = kernel.clone();
  let mut work: VecDeque<Lr0Item> = items.keys().copied().collect();

  while let Some(item) = work.pop_front() {
    let symbols = &bnf.prods[item.prod.0 as usize].symbols;
    let nonterm = match symbols.get(item.dot as usize) {
      Some(Symbol::Nonterm(id)) => *id,
      _ => continue,
    };

    let mut la = BitSet::new(bnf.num_terms());
    sets.first_of_symbols(&mut la, &symbols[item.dot as usize + 1..],
      Some(&items[&item]));

    for &prod in &bnf.nonterms[nonterm.0 as usize].prods {
      let new = Lr0Item {
        prod,
        dot: 0,
      };
      match items.get_mut(&new) {
        Some(old) => {
          if old.union_with(&la) {
            work.push_back(new);
          }
        }
        None => {
          items.insert(new, la.clone());
          work.push_back(new);
        }
      }
    }
  }

  items
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bnf::tests::bnf;
  use pretty_assertions::assert_eq;

  #[test]
  fn dragon_book_lalr() {
    let (_, bnf) = bnf("S = C C; C = \"c\" C | \"d\";", false);
    let sets = FirstSets::new(&bnf);
    let v = gen_vertices(&bnf, &sets);
    // canonical LR(1) has 10 states, merged cores leave 7
    assert_eq!(v.vertices.len(), 7);

    // C -> d . reduces on c, d and $
    let item = Lr0Item {
      prod: ProdId(3),
      dot: 1,
    };
    let la = v.vertices.values()
      .find_map(|vx| vx.kernel.get(&item))
      .unwrap();
    assert_eq!(la.iter().collect::<Vec<_>>(), vec![0, 1, 2]);
  }

  #[test]
  fn deterministic_numbering() {
    let src = "S = (\"a\" | \"b\")* \"c\";";
    let keys = |_: ()| {
      let (_, bnf) = bnf(src, false);
      let sets = FirstSets::new(&bnf);
      gen_vertices(&bnf, &sets).vertices.keys().cloned().collect::<Vec<_>>()
    };
    assert_eq!(keys(()), keys(()));
  }
}
