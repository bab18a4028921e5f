//! Grammar source compiler.
//!
//! ```text
//! grammar = { stmt } ;
//! stmt    = { "^" | "§" } name "=" alt ";" ;
//! alt     = seq { "|" seq } ;
//! seq     = atom { atom } ;
//! atom    = string | name | "@" name "(" [ arg { "," arg } ] ")"
//!         | "(" alt ")" [ "?" | "*" | "+" | "%" | "~" | "!" ]
//!         | "if" name "?" atom ":" atom ;
//! ```
//!
//! Comments run from `#` or `//` to the end of the line. A postfix operator
//! must follow the closing parenthesis directly.

use crate::error::Error;
use crate::scanner::Scanner;
use super::*;

impl RuleIndex {
  /// Compiles grammar source into this index. Rules stay unresolved until
  /// the index is dereferenced by `build`.
  pub fn parse_grammar(&mut self, file: &str, src: &str) -> Result<(), Error> {
    if self.is_dereferenced() {
      return Err(Error::syntax(file, src.as_bytes(), 0,
        "rule index already dereferenced"));
    }
    let base = self.add_source(file, src);
    let n = self.rules.len();
    let mut parser = GrammarParser {
      ri: self,
      sc: Scanner::new(src.as_bytes(), 0, false),
      base,
      file,
      src,
    };
    parser.grammar()?;
    log::debug!("compiled grammar {}: {} new rules", file, self.rules.len() - n);
    Ok(())
  }
}

struct GrammarParser<'a, 'r> {
  ri: &'r mut RuleIndex,
  sc: Scanner<'a>,
  base: usize,
  file: &'a str,
  src: &'a str,
}

impl<'a, 'r> GrammarParser<'a, 'r> {
  fn err(&self, pos: usize, message: impl Into<String>) -> Error {
    Error::syntax(self.file, self.src.as_bytes(), pos, message)
  }

  fn global(&self, pos: usize) -> usize {
    self.base + pos
  }

  fn peek(&self) -> Option<char> {
    self.sc.peek_rune().map(|(c, _)| c)
  }

  fn ws(&mut self) {
    loop {
      self.sc.spaces();
      let comment = self.sc.rune('#') || self.sc.sequence(&['/', '/']);
      if !comment {
        return;
      }
      self.sc.runes_fn(|c| c != '\n');
    }
  }

  fn expect(&mut self, c: char) -> Result<(), Error> {
    if self.sc.rune(c) {
      Ok(())
    } else {
      Err(self.err(self.sc.pos(), format!("expecting {:?}", c)))
    }
  }

  fn grammar(&mut self) -> Result<(), Error> {
    loop {
      self.ws();
      if self.sc.is_end() {
        return Ok(());
      }
      self.statement()?;
    }
  }

  fn statement(&mut self) -> Result<(), Error> {
    let mut start = false;
    let mut no_print = false;
    loop {
      if self.sc.rune('^') {
        start = true;
      } else if self.sc.rune('§') {
        no_print = true;
      } else {
        break;
      }
    }
    let pos = self.sc.pos();
    let name = self.name()?;
    if let Some(Rule::Definition(_)) = self.ri.lookup(&name).map(|id| self.ri.get(id)) {
      return Err(self.err(pos, format!("rule already defined: {}", name)));
    }
    self.ws();
    self.expect('=')?;
    let prod = self.alternation()?;
    self.ws();
    self.expect(';')?;

    let mut def = Definition::new(name.clone(), prod);
    def.start = start;
    def.no_print = no_print;
    def.pos = self.global(pos);
    let id = self.ri.add(Rule::Definition(def));
    self.ri.set_name(name, id);
    Ok(())
  }

  fn name(&mut self) -> Result<String, Error> {
    let start = self.sc.pos();
    if !self.sc.rune_fn(|c| c.is_alphabetic() || c == '_') {
      return Err(self.err(start, "expecting name"));
    }
    self.sc.runes_fn(|c| c.is_alphanumeric() || c == '_');
    Ok(self.src[start..self.sc.pos()].to_owned())
  }

  fn alternation(&mut self) -> Result<RuleId, Error> {
    let mut alts = vec![self.sequence()?];
    loop {
      self.ws();
      if !self.sc.rune('|') {
        break;
      }
      alts.push(self.sequence()?);
    }
    Ok(if alts.len() == 1 {
      alts[0]
    } else {
      self.ri.add(Rule::Alternation(alts))
    })
  }

  fn sequence(&mut self) -> Result<RuleId, Error> {
    let mut items = vec![];
    loop {
      self.ws();
      match self.peek() {
        None | Some('|') | Some(';') | Some(')') | Some(',') | Some(':')
        | Some('?') => break,
        _ => items.push(self.atom()?),
      }
    }
    match items.len() {
      0 => Err(self.err(self.sc.pos(), "expecting expression")),
      1 => Ok(items[0]),
      _ => Ok(self.ri.add(Rule::Sequence(items))),
    }
  }

  fn atom(&mut self) -> Result<RuleId, Error> {
    let pos = self.sc.pos();
    match self.peek() {
      Some('"') | Some('\'') => {
        let runes = self.string()?;
        let mut lit = Literal::sequence(runes);
        lit.pos = self.global(pos);
        Ok(self.ri.add(Rule::Literal(lit)))
      }
      Some('@') => self.procedure(),
      Some('(') => self.group(),
      Some(c) if c.is_alphabetic() || c == '_' => {
        let is_if = self.sc.attempt(|s| {
          s.sequence(&['i', 'f']) && s.rune_fn(char::is_whitespace)
        });
        if is_if {
          return self.conditional(pos);
        }
        let name = self.name()?;
        Ok(self.ri.add(Rule::Reference(Reference {
          name,
          pos: self.global(pos),
        })))
      }
      _ => Err(self.err(pos, "unexpected rune")),
    }
  }

  fn string(&mut self) -> Result<Vec<char>, Error> {
    let start = self.sc.pos();
    let quote = self.sc.read_rune().unwrap_or('"');
    let mut runes = vec![];
    loop {
      let c = match self.sc.read_rune() {
        Some(c) => c,
        None => return Err(self.err(start, "unterminated string")),
      };
      if c == quote {
        break;
      }
      if c == '\\' {
        let esc = match self.sc.read_rune() {
          Some(c) => c,
          None => return Err(self.err(start, "unterminated string")),
        };
        runes.push(match esc {
          'n' => '\n',
          't' => '\t',
          'r' => '\r',
          '0' => '\0',
          c => c,
        });
      } else {
        runes.push(c);
      }
    }
    if runes.is_empty() {
      return Err(self.err(start, "empty string"));
    }
    Ok(runes)
  }

  fn group(&mut self) -> Result<RuleId, Error> {
    let pos = self.sc.pos();
    self.expect('(')?;
    let child = self.alternation()?;
    self.ws();
    self.expect(')')?;

    let repeat = match self.peek() {
      Some('?') => Some(Repeat::Optional),
      Some('*') => Some(Repeat::ZeroOrMore),
      Some('+') => Some(Repeat::OneOrMore),
      Some('%') => return self.literal_op(pos, child, LiteralKind::AnyOf),
      Some('~') => return self.literal_op(pos, child, LiteralKind::SequenceMid),
      Some('!') => return self.literal_op(pos, child, LiteralKind::NoneOf),
      _ => None,
    };
    if repeat.is_some() {
      self.sc.read_rune();
    }
    Ok(self.ri.add(Rule::Group(Group {
      child,
      repeat,
      pos: self.global(pos),
    })))
  }

  fn literal_op(
    &mut self,
    pos: usize,
    child: RuleId,
    kind: LiteralKind,
  ) -> Result<RuleId, Error> {
    self.sc.read_rune();
    let lit = match self.ri.get(child) {
      Rule::Literal(l) if l.kind == LiteralKind::Sequence && l.reference.is_none() => {
        l.clone().with_kind(kind)
      }
      Rule::Reference(_) => {
        let mut l = Literal::sequence(None).with_kind(kind);
        l.reference = Some(child);
        l
      }
      _ => return Err(self.err(pos, "expecting string or name")),
    };
    let lit = Literal {
      pos: self.global(pos),
      ..lit
    };
    Ok(self.ri.add(Rule::Literal(lit)))
  }

  fn procedure(&mut self) -> Result<RuleId, Error> {
    let pos = self.sc.pos();
    self.expect('@')?;
    let name = self.name()?;
    self.ws();
    self.expect('(')?;
    let mut args = vec![];
    self.ws();
    if !self.sc.rune(')') {
      loop {
        self.ws();
        args.push(self.proc_arg()?);
        self.ws();
        if self.sc.rune(')') {
          break;
        }
        self.expect(',')?;
      }
    }
    Ok(self.ri.add(Rule::Procedure(Procedure {
      name,
      args,
      pos: self.global(pos),
    })))
  }

  fn proc_arg(&mut self) -> Result<ProcArg, Error> {
    let pos = self.sc.pos();
    let is_int = self.sc.attempt(|s| {
      s.rune('-');
      s.runes_fn(|c| c.is_ascii_digit())
    });
    if !is_int {
      return Ok(ProcArg::Rule(self.alternation()?));
    }
    let text = &self.src[pos..self.sc.pos()];
    text.parse::<i64>()
      .map(ProcArg::Int)
      .map_err(|e| self.err(pos, format!("invalid integer: {}", e)))
  }

  fn conditional(&mut self, pos: usize) -> Result<RuleId, Error> {
    self.ws();
    let flag_pos = self.sc.pos();
    let flag_name = self.name()?;
    let flag = self.ri.add(Rule::Reference(Reference {
      name: flag_name,
      pos: self.global(flag_pos),
    }));
    self.ws();
    self.expect('?')?;
    self.ws();
    let then = self.atom()?;
    self.ws();
    self.expect(':')?;
    self.ws();
    let otherwise = self.atom()?;
    Ok(self.ri.add(Rule::Conditional(Conditional {
      flag,
      then,
      otherwise,
      pos: self.global(pos),
    })))
  }
}
