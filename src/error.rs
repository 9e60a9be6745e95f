// Copyright 2018-2021 the Deno authors. All rights reserved. MIT license.

use derive_more::Display;

/// An error that occurred while registering a pattern.
#[derive(Debug, Display)]
pub enum Error {
  /// The pattern engine rejected the pattern source.
  #[display(fmt = "{}", _0)]
  Pattern(urlpattern::Error),
  /// A canonical component pattern string could not be re-parsed into
  /// parts. The offset is a code point index into the pattern string.
  #[display(fmt = "invalid pattern string at offset {}", _0)]
  Tokenize(usize),
}

impl std::error::Error for Error {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      Error::Pattern(err) => Some(err),
      Error::Tokenize(_) => None,
    }
  }
}

impl From<urlpattern::Error> for Error {
  fn from(err: urlpattern::Error) -> Error {
    Error::Pattern(err)
  }
}
