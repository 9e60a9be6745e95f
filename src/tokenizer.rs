// Copyright 2018-2021 the Deno authors. All rights reserved. MIT license.

use crate::Error;

// Ref: https://wicg.github.io/urlpattern/#tokens
// Ref: https://wicg.github.io/urlpattern/#tokenizing

// Ref: https://wicg.github.io/urlpattern/#token-type
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum TokenType {
  Open,
  Close,
  Regexp,
  Name,
  Char,
  EscapedChar,
  OtherModifier,
  Asterisk,
  End,
}

// Ref: https://wicg.github.io/urlpattern/#token
#[derive(Debug, Clone)]
pub(crate) struct Token {
  pub kind: TokenType,
  pub index: usize,
  pub value: String,
}

impl Token {
  fn new(kind: TokenType, index: usize, value: impl Into<String>) -> Token {
    Token {
      kind,
      index,
      value: value.into(),
    }
  }
}

/// Tokenize a canonical component pattern string. The inputs here are
/// produced by the pattern engine, so this always runs under the strict
/// tokenize policy: any invalid code point is an error rather than an
/// `InvalidChar` token.
// Ref: https://wicg.github.io/urlpattern/#tokenize
pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, Error> {
  let chars = input.chars().collect::<Vec<_>>();
  let mut token_list = Vec::new();
  let mut index = 0;
  while index < chars.len() {
    match chars[index] {
      '*' => {
        token_list.push(Token::new(TokenType::Asterisk, index, "*"));
        index += 1;
      }
      c @ ('+' | '?') => {
        token_list.push(Token::new(TokenType::OtherModifier, index, c));
        index += 1;
      }
      '\\' => {
        if index == chars.len() - 1 {
          return Err(Error::Tokenize(index));
        }
        token_list.push(Token::new(
          TokenType::EscapedChar,
          index,
          chars[index + 1],
        ));
        index += 2;
      }
      '{' => {
        token_list.push(Token::new(TokenType::Open, index, "{"));
        index += 1;
      }
      '}' => {
        token_list.push(Token::new(TokenType::Close, index, "}"));
        index += 1;
      }
      ':' => {
        let name_start = index + 1;
        let mut name_end = name_start;
        while name_end < chars.len()
          && is_valid_name_codepoint(chars[name_end], name_end == name_start)
        {
          name_end += 1;
        }
        if name_end == name_start {
          return Err(Error::Tokenize(index));
        }
        token_list.push(Token::new(
          TokenType::Name,
          index,
          chars[name_start..name_end].iter().collect::<String>(),
        ));
        index = name_end;
      }
      '(' => {
        let (token, next_index) = tokenize_regexp(&chars, index)?;
        token_list.push(token);
        index = next_index;
      }
      c => {
        token_list.push(Token::new(TokenType::Char, index, c));
        index += 1;
      }
    }
  }
  token_list.push(Token::new(TokenType::End, chars.len(), ""));
  Ok(token_list)
}

/// Scan a `(regexp)` token starting at the open parenthesis. Nested
/// groups must be non-capturing, and the content must be ASCII.
fn tokenize_regexp(
  chars: &[char],
  open_index: usize,
) -> Result<(Token, usize), Error> {
  let mut depth = 1;
  let regexp_start = open_index + 1;
  let mut pos = regexp_start;
  while pos < chars.len() {
    let c = chars[pos];
    if !c.is_ascii() {
      return Err(Error::Tokenize(open_index));
    }
    if pos == regexp_start && c == '?' {
      return Err(Error::Tokenize(open_index));
    }
    if c == '\\' {
      if pos == chars.len() - 1 || !chars[pos + 1].is_ascii() {
        return Err(Error::Tokenize(open_index));
      }
      pos += 2;
      continue;
    }
    if c == ')' {
      depth -= 1;
      if depth == 0 {
        pos += 1;
        break;
      }
    } else if c == '(' {
      depth += 1;
      if pos == chars.len() - 1 || chars[pos + 1] != '?' {
        return Err(Error::Tokenize(open_index));
      }
    }
    pos += 1;
  }
  if depth != 0 {
    return Err(Error::Tokenize(open_index));
  }
  let regexp_end = pos - 1;
  if regexp_end == regexp_start {
    return Err(Error::Tokenize(open_index));
  }
  let token = Token::new(
    TokenType::Regexp,
    open_index,
    chars[regexp_start..regexp_end].iter().collect::<String>(),
  );
  Ok((token, pos))
}

// Ref: https://wicg.github.io/urlpattern/#is-a-valid-name-code-point
pub(crate) fn is_valid_name_codepoint(code_point: char, first: bool) -> bool {
  if first {
    unic_ucd_ident::is_id_start(code_point) || matches!(code_point, '$' | '_')
  } else {
    unic_ucd_ident::is_id_continue(code_point)
      || matches!(code_point, '$' | '_' | '\u{200C}' | '\u{200D}')
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kinds(input: &str) -> Vec<TokenType> {
    tokenize(input).unwrap().iter().map(|t| t.kind).collect()
  }

  #[test]
  fn tokenizes_plain_text_to_char_tokens() {
    assert_eq!(
      kinds("/foo"),
      vec![
        TokenType::Char,
        TokenType::Char,
        TokenType::Char,
        TokenType::Char,
        TokenType::End
      ]
    );
  }

  #[test]
  fn tokenizes_names_and_regexp_groups() {
    let tokens = tokenize("/:id(\\d+)?").unwrap();
    let kinds = tokens.iter().map(|t| t.kind).collect::<Vec<_>>();
    assert_eq!(
      kinds,
      vec![
        TokenType::Char,
        TokenType::Name,
        TokenType::Regexp,
        TokenType::OtherModifier,
        TokenType::End
      ]
    );
    assert_eq!(tokens[1].value, "id");
    assert_eq!(tokens[2].value, "\\d+");
  }

  #[test]
  fn name_stops_at_invalid_codepoint() {
    let tokens = tokenize(":title.txt").unwrap();
    assert_eq!(tokens[0].kind, TokenType::Name);
    assert_eq!(tokens[0].value, "title");
    assert_eq!(tokens[1].kind, TokenType::Char);
    assert_eq!(tokens[1].value, ".");
  }

  #[test]
  fn escaped_char_keeps_only_the_escaped_codepoint() {
    let tokens = tokenize("a\\:b").unwrap();
    assert_eq!(tokens[1].kind, TokenType::EscapedChar);
    assert_eq!(tokens[1].value, ":");
  }

  #[test]
  fn nested_capturing_group_is_rejected() {
    assert!(tokenize("(a(b))").is_err());
    assert!(tokenize("(a(?:b))").is_ok());
  }

  #[test]
  fn unbalanced_or_empty_regexp_is_rejected() {
    assert!(tokenize("(abc").is_err());
    assert!(tokenize("()").is_err());
    assert!(tokenize("(?a)").is_err());
  }

  #[test]
  fn trailing_backslash_is_rejected() {
    assert!(tokenize("foo\\").is_err());
  }

  #[test]
  fn groups_and_modifiers() {
    assert_eq!(
      kinds("{ab}+"),
      vec![
        TokenType::Open,
        TokenType::Char,
        TokenType::Char,
        TokenType::Close,
        TokenType::OtherModifier,
        TokenType::End
      ]
    );
  }
}
