// Copyright 2018-2021 the Deno authors. All rights reserved. MIT license.

use crate::tokenizer::tokenize;
use crate::tokenizer::Token;
use crate::tokenizer::TokenType;
use crate::tree::PatternHandle;
use crate::Error;

// Ref: https://wicg.github.io/urlpattern/#full-wildcard-regexp-value
const FULL_WILDCARD_REGEXP_VALUE: &str = ".*";

/// The URL component a part belongs to. The variants are declared in the
/// order components appear in a URL; both a pattern's part list and a
/// URL's component list are walked in this order, so the matcher can merge
/// the two instead of searching.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub(crate) enum PatternComponent {
  Protocol,
  Username,
  Password,
  Hostname,
  Port,
  Pathname,
  Search,
  Hash,
}

impl PatternComponent {
  pub(crate) const ALL: [PatternComponent; 8] = [
    PatternComponent::Protocol,
    PatternComponent::Username,
    PatternComponent::Password,
    PatternComponent::Hostname,
    PatternComponent::Port,
    PatternComponent::Pathname,
    PatternComponent::Search,
    PatternComponent::Hash,
  ];
}

// Ref: https://wicg.github.io/urlpattern/#part-type
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum PartType {
  FixedText,
  Regexp,
  SegmentWildcard,
  FullWildcard,
}

// Ref: https://wicg.github.io/urlpattern/#part-modifier
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum PartModifier {
  None,
  Optional,
  ZeroOrMore,
  OneOrMore,
}

impl PartModifier {
  /// Whether the engine's regexp for a part with this modifier can match
  /// the empty string outright.
  pub(crate) fn allows_zero(self) -> bool {
    matches!(self, PartModifier::Optional | PartModifier::ZeroOrMore)
  }

  pub(crate) fn is_repeating(self) -> bool {
    matches!(self, PartModifier::ZeroOrMore | PartModifier::OneOrMore)
  }
}

// Ref: https://wicg.github.io/urlpattern/#part
#[derive(Debug, Clone)]
pub(crate) struct Part {
  pub kind: PartType,
  pub component: PatternComponent,
  pub value: String,
  pub modifier: PartModifier,
  pub name: String,
  pub prefix: String,
  pub suffix: String,
}

impl Part {
  fn new(
    component: PatternComponent,
    kind: PartType,
    value: String,
    modifier: PartModifier,
  ) -> Part {
    Part {
      kind,
      component,
      value,
      modifier,
      name: String::new(),
      prefix: String::new(),
      suffix: String::new(),
    }
  }

  /// Structural equivalence: two parts address the same tree node when
  /// everything except the capture name agrees. Name-insensitivity is
  /// what lets `/books/:id` and `/books/:bookId` share a node.
  pub(crate) fn same_structure(&self, other: &Part) -> bool {
    self.kind == other.kind
      && self.component == other.component
      && self.modifier == other.modifier
      && self.value == other.value
      && self.prefix == other.prefix
      && self.suffix == other.suffix
  }
}

// Ref: https://wicg.github.io/urlpattern/#options-header
pub(crate) struct Options {
  delimiter_code_point: String,
  prefix_code_point: String,
}

impl Options {
  fn for_component(component: PatternComponent) -> Options {
    match component {
      PatternComponent::Hostname => Options {
        delimiter_code_point: ".".to_owned(),
        prefix_code_point: String::new(),
      },
      PatternComponent::Pathname => Options {
        delimiter_code_point: "/".to_owned(),
        prefix_code_point: "/".to_owned(),
      },
      _ => Options {
        delimiter_code_point: String::new(),
        prefix_code_point: String::new(),
      },
    }
  }

  // Ref: https://wicg.github.io/urlpattern/#generate-a-segment-wildcard-regexp
  fn segment_wildcard_regexp(&self) -> String {
    format!("[^{}]+?", escape_regexp_string(&self.delimiter_code_point))
  }
}

// Ref: https://wicg.github.io/urlpattern/#pattern-parser
struct PatternParser {
  component: PatternComponent,
  token_list: Vec<Token>,
  segment_wildcard_regexp: String,
  part_list: Vec<Part>,
  pending_fixed_value: String,
  index: usize,
  next_numeric_name: usize,
}

impl PatternParser {
  // Ref: https://wicg.github.io/urlpattern/#try-to-consume-a-token
  fn try_consume_token(&mut self, kind: TokenType) -> Option<Token> {
    debug_assert!(self.index < self.token_list.len());
    let next_token = &self.token_list[self.index];
    if next_token.kind != kind {
      None
    } else {
      self.index += 1;
      Some(next_token.clone())
    }
  }

  // Ref: https://wicg.github.io/urlpattern/#try-to-consume-a-regexp-or-wildcard-token
  fn try_consume_regexp_or_wildcard_token(
    &mut self,
    has_name: bool,
  ) -> Option<Token> {
    let token = self.try_consume_token(TokenType::Regexp);
    if !has_name && token.is_none() {
      self.try_consume_token(TokenType::Asterisk)
    } else {
      token
    }
  }

  // Ref: https://wicg.github.io/urlpattern/#try-to-consume-a-modifier-token
  fn try_consume_modifier_token(&mut self) -> Option<Token> {
    self
      .try_consume_token(TokenType::OtherModifier)
      .or_else(|| self.try_consume_token(TokenType::Asterisk))
  }

  // Ref: https://wicg.github.io/urlpattern/#maybe-add-a-part-from-the-pending-fixed-value
  fn maybe_add_part_from_pending_fixed_value(&mut self) {
    if self.pending_fixed_value.is_empty() {
      return;
    }
    let value = std::mem::take(&mut self.pending_fixed_value);
    self.part_list.push(Part::new(
      self.component,
      PartType::FixedText,
      value,
      PartModifier::None,
    ));
  }

  // Ref: https://wicg.github.io/urlpattern/#add-a-part
  fn add_part(
    &mut self,
    prefix: &str,
    name_token: Option<Token>,
    regexp_or_wildcard_token: Option<Token>,
    suffix: &str,
    modifier_token: Option<Token>,
  ) {
    let modifier = match modifier_token.as_ref().map(|t| t.value.as_str()) {
      Some("?") => PartModifier::Optional,
      Some("*") => PartModifier::ZeroOrMore,
      Some("+") => PartModifier::OneOrMore,
      Some(_) => unreachable!(),
      None => PartModifier::None,
    };
    if name_token.is_none()
      && regexp_or_wildcard_token.is_none()
      && modifier == PartModifier::None
    {
      self.pending_fixed_value.push_str(prefix);
      return;
    }
    self.maybe_add_part_from_pending_fixed_value();
    if name_token.is_none() && regexp_or_wildcard_token.is_none() {
      debug_assert!(suffix.is_empty());
      if prefix.is_empty() {
        return;
      }
      self.part_list.push(Part::new(
        self.component,
        PartType::FixedText,
        prefix.to_owned(),
        modifier,
      ));
      return;
    }

    let mut regexp_value = match &regexp_or_wildcard_token {
      None => self.segment_wildcard_regexp.clone(),
      Some(token) if token.kind == TokenType::Asterisk => {
        FULL_WILDCARD_REGEXP_VALUE.to_owned()
      }
      Some(token) => token.value.clone(),
    };
    let mut kind = PartType::Regexp;
    if regexp_value == self.segment_wildcard_regexp {
      kind = PartType::SegmentWildcard;
      regexp_value = String::new();
    } else if regexp_value == FULL_WILDCARD_REGEXP_VALUE {
      kind = PartType::FullWildcard;
      regexp_value = String::new();
    }

    let name = match name_token {
      Some(token) => token.value,
      None => {
        let name = self.next_numeric_name.to_string();
        self.next_numeric_name += 1;
        name
      }
    };

    self.part_list.push(Part {
      kind,
      component: self.component,
      value: regexp_value,
      modifier,
      name,
      prefix: prefix.to_owned(),
      suffix: suffix.to_owned(),
    });
  }

  // Ref: https://wicg.github.io/urlpattern/#consume-text
  fn consume_text(&mut self) -> String {
    let mut result = String::new();
    loop {
      let token = self
        .try_consume_token(TokenType::Char)
        .or_else(|| self.try_consume_token(TokenType::EscapedChar));
      match token {
        Some(token) => result.push_str(&token.value),
        None => break,
      }
    }
    result
  }

  // Ref: https://wicg.github.io/urlpattern/#consume-a-required-token
  fn consume_required_token(&mut self, kind: TokenType) -> Result<Token, Error> {
    let index = self.token_list[self.index].index;
    self.try_consume_token(kind).ok_or(Error::Tokenize(index))
  }
}

/// Parse one component's canonical pattern string into its tagged part
/// list. The input comes from the pattern engine, so no encoding callback
/// is applied here: every code point is already canonical for its
/// component.
// Ref: https://wicg.github.io/urlpattern/#parse-a-pattern-string
pub(crate) fn parse_component_string(
  component: PatternComponent,
  input: &str,
) -> Result<Vec<Part>, Error> {
  let options = Options::for_component(component);
  let mut parser = PatternParser {
    component,
    token_list: tokenize(input)?,
    segment_wildcard_regexp: options.segment_wildcard_regexp(),
    part_list: vec![],
    pending_fixed_value: String::new(),
    index: 0,
    next_numeric_name: 0,
  };

  while parser.index < parser.token_list.len() {
    let char_token = parser.try_consume_token(TokenType::Char);
    let name_token = parser.try_consume_token(TokenType::Name);
    let regexp_or_wildcard_token =
      parser.try_consume_regexp_or_wildcard_token(name_token.is_some());
    if name_token.is_some() || regexp_or_wildcard_token.is_some() {
      let mut prefix = match &char_token {
        Some(token) => token.value.clone(),
        None => String::new(),
      };
      if !prefix.is_empty() && prefix != options.prefix_code_point {
        parser.pending_fixed_value.push_str(&prefix);
        prefix.clear();
      }
      parser.maybe_add_part_from_pending_fixed_value();
      let modifier_token = parser.try_consume_modifier_token();
      parser.add_part(
        &prefix,
        name_token,
        regexp_or_wildcard_token,
        "",
        modifier_token,
      );
      continue;
    }
    let fixed_token = char_token
      .or_else(|| parser.try_consume_token(TokenType::EscapedChar));
    if let Some(token) = fixed_token {
      parser.pending_fixed_value.push_str(&token.value);
      continue;
    }
    if parser.try_consume_token(TokenType::Open).is_some() {
      let prefix = parser.consume_text();
      let name_token = parser.try_consume_token(TokenType::Name);
      let regexp_or_wildcard_token =
        parser.try_consume_regexp_or_wildcard_token(name_token.is_some());
      let suffix = parser.consume_text();
      parser.consume_required_token(TokenType::Close)?;
      let modifier_token = parser.try_consume_modifier_token();
      parser.add_part(
        &prefix,
        name_token,
        regexp_or_wildcard_token,
        &suffix,
        modifier_token,
      );
      continue;
    }
    parser.maybe_add_part_from_pending_fixed_value();
    parser.consume_required_token(TokenType::End)?;
  }

  Ok(parser.part_list)
}

/// Derive the full ordered part list for a compiled pattern from its
/// canonical component pattern strings. Components whose pattern is the
/// catch-all contribute no parts and therefore no tree nodes.
pub(crate) fn parse_pattern_parts(
  pattern: &PatternHandle,
) -> Result<Vec<Part>, Error> {
  let mut parts = Vec::new();
  for component in PatternComponent::ALL {
    let pattern_string = component_pattern_string(pattern, component);
    if pattern_string == "*" {
      continue;
    }
    let part_list = parse_component_string(component, pattern_string)?;
    parts.extend(split_fixed_parts(component, part_list));
  }
  Ok(parts)
}

fn component_pattern_string(
  pattern: &PatternHandle,
  component: PatternComponent,
) -> &str {
  match component {
    PatternComponent::Protocol => pattern.protocol(),
    PatternComponent::Username => pattern.username(),
    PatternComponent::Password => pattern.password(),
    PatternComponent::Hostname => pattern.hostname(),
    PatternComponent::Port => pattern.port(),
    PatternComponent::Pathname => pattern.pathname(),
    PatternComponent::Search => pattern.search(),
    PatternComponent::Hash => pattern.hash(),
  }
}

/// Split unmodified fixed literals of `/`-structured components at every
/// `/` so each segment becomes its own part. Registration is then strictly
/// append-only: a new route extends the walk at a segment boundary instead
/// of splitting an existing node's literal.
pub(crate) fn split_fixed_parts(
  component: PatternComponent,
  part_list: Vec<Part>,
) -> Vec<Part> {
  if !matches!(
    component,
    PatternComponent::Pathname
      | PatternComponent::Search
      | PatternComponent::Hash
  ) {
    return part_list;
  }
  let mut out = Vec::with_capacity(part_list.len());
  for part in part_list {
    if part.kind == PartType::FixedText
      && part.modifier == PartModifier::None
      && part.value.contains('/')
    {
      for piece in split_at_slashes(&part.value) {
        out.push(Part::new(
          component,
          PartType::FixedText,
          piece,
          PartModifier::None,
        ));
      }
    } else {
      out.push(part);
    }
  }
  out
}

/// `"/api/users"` becomes `["/api", "/users"]`; a leading non-slash run is
/// kept as its own piece (`"a/b"` becomes `["a", "/b"]`).
fn split_at_slashes(value: &str) -> Vec<String> {
  let mut pieces = Vec::new();
  let mut start = 0;
  for (index, c) in value.char_indices() {
    if c == '/' && index > start {
      pieces.push(value[start..index].to_owned());
      start = index;
    }
  }
  pieces.push(value[start..].to_owned());
  pieces
}

// Ref: https://wicg.github.io/urlpattern/#escape-a-regexp-string
fn escape_regexp_string(input: &str) -> String {
  debug_assert!(input.is_ascii());
  let mut result = String::new();
  for c in input.chars() {
    if matches!(
      c,
      '.'
        | '+'
        | '*'
        | '?'
        | '^'
        | '$'
        | '{'
        | '}'
        | '('
        | ')'
        | '['
        | ']'
        | '|'
        | '/'
        | '\\'
    ) {
      result.push('\\');
    }
    result.push(c);
  }
  result
}
