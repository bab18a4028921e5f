use std::fmt::{self, Display, Formatter};
use thiserror::Error;

pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  /// Grammar source or dereference error.
  #[error("{location}: {message}: {}", .location.context)]
  Syntax {
    location: Location,
    message: String,
  },

  #[error("{location}: {kind} conflict in state {state} on {rule}: {actions}: {}",
    .location.context)]
  Conflict {
    /// Definition of the first reduced production.
    location: Location,
    kind: &'static str,
    state: usize,
    rule: String,
    actions: String,
  },

  #[error("{location}: literal overlap in state {state}: {a} and {b}: {}",
    .location.context)]
  LiteralOverlap {
    location: Location,
    state: usize,
    a: String,
    b: String,
  },

  #[error("start rule: {0}")]
  StartRule(String),

  #[error("unknown rule: {0}")]
  UnknownRule(String),

  #[error("{location}: {message}: {}", .location.context)]
  Parse {
    location: Location,
    message: String,
  },

  #[error("{location}: {rule}: {source}")]
  Callback {
    location: Location,
    rule: String,
    #[source]
    source: CallbackError,
  },

  #[error("{}", display_list(.0))]
  Multiple(Vec<Error>),
}

impl Error {
  pub(crate) fn syntax(
    file: &str,
    src: &[u8],
    pos: usize,
    message: impl Into<String>,
  ) -> Self {
    Error::Syntax {
      location: Location::resolve(Some(file), src, pos),
      message: message.into(),
    }
  }

  pub(crate) fn parse(src: &[u8], pos: usize, message: impl Into<String>) -> Self {
    Error::Parse {
      location: Location::resolve(None, src, pos),
      message: message.into(),
    }
  }

  /// Collapses a list of errors, `None` when the list is empty.
  pub(crate) fn from_list(mut errors: Vec<Error>) -> Option<Self> {
    match errors.len() {
      0 => None,
      1 => errors.pop(),
      _ => Some(Error::Multiple(errors)),
    }
  }

  /// Byte offset of the error in its source, if it has one.
  pub fn offset(&self) -> Option<usize> {
    match self {
      Error::Syntax { location, .. }
      | Error::Conflict { location, .. }
      | Error::LiteralOverlap { location, .. }
      | Error::Parse { location, .. }
      | Error::Callback { location, .. } => Some(location.offset),
      _ => None,
    }
  }
}

fn display_list(errors: &[Error]) -> String {
  errors.iter()
    .map(|e| e.to_string())
    .collect::<Vec<_>>()
    .join("\n")
}

/// Source position resolved to line and column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
  pub file: Option<String>,
  pub offset: usize,
  /// 1-based.
  pub line: usize,
  /// 1-based, in runes.
  pub column: usize,
  /// Text surrounding the offset, on its line.
  pub context: String,
}

const CONTEXT_RADIUS: usize = 20;

impl Location {
  pub fn resolve(file: Option<&str>, src: &[u8], offset: usize) -> Self {
    let offset = offset.min(src.len());
    let line_start = src[..offset].iter()
      .rposition(|&b| b == b'\n')
      .map_or(0, |i| i + 1);
    let line_end = src[offset..].iter()
      .position(|&b| b == b'\n')
      .map_or(src.len(), |i| offset + i);
    let line = src[..line_start].iter().filter(|&&b| b == b'\n').count() + 1;

    let before = String::from_utf8_lossy(&src[line_start..offset]);
    let after = String::from_utf8_lossy(&src[offset..line_end]);
    let column = before.chars().count() + 1;

    let skip = before.chars().count().saturating_sub(CONTEXT_RADIUS);
    let mut context = before.chars().skip(skip).collect::<String>();
    context.push('●');
    context.extend(after.chars().take(CONTEXT_RADIUS));

    Location {
      file: file.map(|s| s.to_owned()),
      offset,
      line,
      column,
      context: format!("{:?}", context),
    }
  }
}

impl Display for Location {
  fn fmt(&self, f: &mut Formatter) -> fmt::Result {
    match &self.file {
      Some(file) => write!(f, "{}:{}:{}", file, self.line, self.column),
      None => write!(f, "{}:{}", self.line, self.column),
    }
  }
}
