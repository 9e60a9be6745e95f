// Copyright 2018-2021 the Deno authors. All rights reserved. MIT license.

use regex::Regex;
use url::Url;
use urlpattern::UrlPatternMatchInput;
use urlpattern::UrlPatternResult;

use crate::parser::Part;
use crate::parser::PartModifier;
use crate::parser::PartType;
use crate::parser::PatternComponent;
use crate::tree::NodeId;
use crate::tree::NodeKind;
use crate::tree::PrefixTree;
use crate::tree::ROOT;

/// Upper bound on consumption attempts in a single match. Wildcard nodes
/// with children backtrack over every consumption length, which can go
/// quadratic on shapes like `*x*x*`; once the budget is spent the whole
/// match is treated as a miss. Realistic route tables stay orders of
/// magnitude below this.
pub(crate) const BACKTRACK_LIMIT: usize = 1 << 16;

/// One non-empty component of the URL being matched. The list is ordered
/// by component, mirroring the order parts carry, so walking both is a
/// merge rather than a search.
pub(crate) struct UrlComponent<'a> {
  pub component: PatternComponent,
  pub text: &'a str,
}

/// The best candidate so far: the lowest sequence the engine has
/// confirmed, together with its exec result.
pub(crate) struct BestMatch {
  pub sequence: usize,
  pub result: UrlPatternResult,
}

struct MatchState<'a> {
  components: &'a [UrlComponent<'a>],
  url: &'a Url,
  attempts: usize,
  exhausted: bool,
  best: Option<BestMatch>,
}

impl<T> PrefixTree<T> {
  /// Walk the tree and return the earliest-registered pattern the engine
  /// confirms for `url`, or `None`.
  pub(crate) fn find_best(
    &self,
    url: &Url,
    components: &[UrlComponent<'_>],
  ) -> Option<BestMatch> {
    let mut state = MatchState {
      components,
      url,
      attempts: 0,
      exhausted: false,
      best: None,
    };
    self.visit(&mut state, ROOT, 0, 0);
    if state.exhausted {
      tracing::debug!(
        limit = BACKTRACK_LIMIT,
        "backtracking budget exhausted; treating the match as a miss"
      );
      return None;
    }
    state.best
  }

  /// Continue the walk below a node whose own part has already consumed
  /// input up to (`component_index`, `position`).
  fn visit(
    &self,
    state: &mut MatchState<'_>,
    node_id: NodeId,
    component_index: usize,
    position: usize,
  ) {
    if state.exhausted {
      return;
    }
    let node = self.node(node_id);

    // Children before this node's own patterns: a subtree can hold an
    // earlier registration than any pattern terminating here, and
    // first-match-wins is decided by sequence, not tree depth.
    for &child_id in &node.children {
      if state.exhausted {
        return;
      }
      let child = self.node(child_id);
      if let Some(best) = &state.best {
        if child.min_sequence > best.sequence {
          continue;
        }
      }
      let Some(part) = child.part() else {
        continue;
      };
      // Locate the first remaining URL component with this child's tag;
      // a same-tag child continues inside the current component.
      let mut index = component_index;
      while index < state.components.len()
        && state.components[index].component < part.component
      {
        index += 1;
      }
      if index >= state.components.len()
        || state.components[index].component != part.component
      {
        continue;
      }
      let child_position = if index == component_index { position } else { 0 };
      self.descend(state, child_id, index, child_position);
    }
    if state.exhausted {
      return;
    }

    if node.patterns.is_empty() {
      return;
    }
    // A pattern terminating here constrains nothing past this component;
    // its patterns count only once the component is fully consumed, and
    // the engine has the final word on the rest of the URL.
    let consumed = match &node.kind {
      NodeKind::Root => true,
      NodeKind::Part { .. } => {
        component_index < state.components.len()
          && position >= state.components[component_index].text.len()
      }
    };
    if !consumed {
      return;
    }
    for &sequence in &node.patterns {
      if let Some(best) = &state.best {
        if sequence >= best.sequence {
          continue;
        }
      }
      let registered = self.pattern(sequence);
      let input = UrlPatternMatchInput::Url(state.url.clone());
      match registered.pattern.exec(input) {
        Ok(Some(result)) => {
          state.best = Some(BestMatch { sequence, result });
        }
        Ok(None) => {
          // The tree over-accepted; count it as a local miss and keep
          // walking.
          tracing::debug!(
            sequence,
            "tree candidate rejected by the pattern engine"
          );
        }
        Err(err) => {
          tracing::debug!(
            sequence,
            error = %err,
            "pattern engine failed while confirming a tree candidate"
          );
        }
      }
    }
  }

  /// Let a child node consume input starting at (`component_index`,
  /// `position`) according to its part kind and modifier.
  fn descend(
    &self,
    state: &mut MatchState<'_>,
    node_id: NodeId,
    component_index: usize,
    position: usize,
  ) {
    let node = self.node(node_id);
    let NodeKind::Part { part, regex } = &node.kind else {
      return;
    };
    debug_assert_eq!(
      part.component,
      state.components[component_index].component
    );
    let has_children = !node.children.is_empty();
    match part.kind {
      PartType::FixedText => {
        self.consume_fixed(state, node_id, part, component_index, position)
      }
      PartType::SegmentWildcard => self.consume_segment_wildcard(
        state,
        node_id,
        part,
        component_index,
        position,
        has_children,
      ),
      PartType::FullWildcard => self.consume_full_wildcard(
        state,
        node_id,
        part,
        component_index,
        position,
        has_children,
      ),
      PartType::Regexp => self.consume_regexp(
        state,
        node_id,
        part,
        regex.as_ref(),
        component_index,
        position,
      ),
    }
  }

  /// One consumption candidate: charge the budget, then continue the walk
  /// at the consumed position. Returns whether the candidate improved the
  /// best match.
  fn attempt(
    &self,
    state: &mut MatchState<'_>,
    node_id: NodeId,
    component_index: usize,
    position: usize,
  ) -> bool {
    if state.exhausted {
      return false;
    }
    state.attempts += 1;
    if state.attempts > BACKTRACK_LIMIT {
      state.exhausted = true;
      state.best = None;
      return false;
    }
    let before = state.best.as_ref().map(|best| best.sequence);
    self.visit(state, node_id, component_index, position);
    match (state.best.as_ref(), before) {
      (Some(best), Some(previous)) => best.sequence < previous,
      (Some(_), None) => true,
      _ => false,
    }
  }

  fn consume_fixed(
    &self,
    state: &mut MatchState<'_>,
    node_id: NodeId,
    part: &Part,
    component_index: usize,
    position: usize,
  ) {
    let text = state.components[component_index].text;
    let value = part.value.as_str();
    if value.is_empty() {
      self.attempt(state, node_id, component_index, position);
      return;
    }
    match part.modifier {
      PartModifier::None => {
        if text[position..].starts_with(value) {
          self.attempt(state, node_id, component_index, position + value.len());
        }
      }
      PartModifier::Optional => {
        let end = if text[position..].starts_with(value) {
          position + value.len()
        } else {
          position
        };
        self.attempt(state, node_id, component_index, end);
      }
      PartModifier::ZeroOrMore | PartModifier::OneOrMore => {
        let mut end = position;
        while text[end..].starts_with(value) {
          end += value.len();
        }
        if end == position && part.modifier == PartModifier::OneOrMore {
          return;
        }
        self.attempt(state, node_id, component_index, end);
      }
    }
  }

  fn consume_segment_wildcard(
    &self,
    state: &mut MatchState<'_>,
    node_id: NodeId,
    part: &Part,
    component_index: usize,
    position: usize,
    has_children: bool,
  ) {
    let text = state.components[component_index].text;
    // Zero consumption comes first so shorter bindings win, mirroring the
    // lazy hole in the engine's regexp.
    if part.modifier.allows_zero() {
      if self.attempt(state, node_id, component_index, position) {
        return;
      }
    }
    if part.modifier.is_repeating() {
      for end in repeated_ends(part, None, text, position) {
        if self.attempt(state, node_id, component_index, end) {
          return;
        }
        if state.exhausted {
          return;
        }
      }
      // The engine accepts zero repetitions for some one-or-more shapes
      // (`/test*+` accepting `/test`), so retry with zero consumption
      // before giving up.
      if part.modifier == PartModifier::OneOrMore {
        self.attempt(state, node_id, component_index, position);
      }
      return;
    }

    let Some(content_start) = strip_prefix_at(text, position, &part.prefix)
    else {
      return;
    };
    let limit = if part.component == PatternComponent::Pathname {
      next_slash(text, content_start)
    } else {
      text.len()
    };
    if has_children {
      // Shortest content first: later fixed literals get the longest
      // residual to bind against. The first consumption length whose
      // subtree produces a match wins.
      let region = &text[content_start..limit];
      for (offset, c) in region.char_indices() {
        let content_end = content_start + offset + c.len_utf8();
        let Some(end) = apply_suffix(text, content_end, &part.suffix) else {
          continue;
        };
        if self.attempt(state, node_id, component_index, end) {
          return;
        }
        if state.exhausted {
          return;
        }
      }
    } else if content_end_before_suffix(
      text,
      content_start,
      limit,
      &part.suffix,
    )
    .is_some()
    {
      // No children: the hole binds the whole run up to the natural
      // segment boundary.
      self.attempt(state, node_id, component_index, limit);
    }
  }

  fn consume_full_wildcard(
    &self,
    state: &mut MatchState<'_>,
    node_id: NodeId,
    part: &Part,
    component_index: usize,
    position: usize,
    has_children: bool,
  ) {
    let text = state.components[component_index].text;
    // Modifiers whose engine regexp can skip the group entirely get a
    // zero-consumption attempt first.
    if part.modifier != PartModifier::None {
      self.attempt(state, node_id, component_index, position);
      if state.exhausted {
        return;
      }
    }
    let Some(content_start) = strip_prefix_at(text, position, &part.prefix)
    else {
      return;
    };
    if !has_children {
      // Full wildcards swallow the rest of the component, empty included.
      if text.len() - content_start >= part.suffix.len()
        && text[content_start..].ends_with(&part.suffix)
      {
        self.attempt(state, node_id, component_index, text.len());
      }
      return;
    }
    // Greedy, then shrink: every content length down to empty gets a
    // recursive attempt, bounded by the backtracking budget.
    let region = &text[content_start..];
    let mut content_ends = Vec::with_capacity(region.chars().count() + 1);
    content_ends.push(content_start);
    content_ends.extend(
      region
        .char_indices()
        .map(|(offset, c)| content_start + offset + c.len_utf8()),
    );
    for &content_end in content_ends.iter().rev() {
      let Some(end) = apply_suffix(text, content_end, &part.suffix) else {
        continue;
      };
      self.attempt(state, node_id, component_index, end);
      if state.exhausted {
        return;
      }
    }
  }

  fn consume_regexp(
    &self,
    state: &mut MatchState<'_>,
    node_id: NodeId,
    part: &Part,
    regex: Option<&Regex>,
    component_index: usize,
    position: usize,
  ) {
    let text = state.components[component_index].text;
    if part.modifier.allows_zero() {
      if self.attempt(state, node_id, component_index, position) {
        return;
      }
    }
    if part.modifier.is_repeating() {
      for end in repeated_ends(part, regex, text, position) {
        if self.attempt(state, node_id, component_index, end) {
          return;
        }
        if state.exhausted {
          return;
        }
      }
      if part.modifier == PartModifier::OneOrMore {
        self.attempt(state, node_id, component_index, position);
      }
      return;
    }
    let Some(content_start) = strip_prefix_at(text, position, &part.prefix)
    else {
      return;
    };
    // One `/`-bounded run for pathnames, the whole remainder elsewhere.
    let boundary = if part.component == PatternComponent::Pathname {
      next_slash(text, content_start)
    } else {
      text.len()
    };
    let Some(content_end) =
      content_end_before_suffix(text, content_start, boundary, &part.suffix)
    else {
      return;
    };
    if let Some(regex) = regex {
      if !regex.is_match(&text[content_start..content_end]) {
        return;
      }
    }
    self.attempt(state, node_id, component_index, boundary);
  }
}

/// End positions after consuming 1, 2, ... repetitions of
/// `prefix + content (+ suffix)`, each repetition bounded at the next `/`
/// for pathnames. `filter` rejects repetitions whose content the part's
/// compiled regexp does not accept.
fn repeated_ends(
  part: &Part,
  filter: Option<&Regex>,
  text: &str,
  start: usize,
) -> Vec<usize> {
  let pathname = part.component == PatternComponent::Pathname;
  let mut ends = Vec::new();
  let mut pos = start;
  while pos < text.len() {
    let Some(content_start) = strip_prefix_at(text, pos, &part.prefix) else {
      break;
    };
    let boundary = if pathname {
      next_slash(text, content_start)
    } else {
      text.len()
    };
    let Some(content_end) =
      content_end_before_suffix(text, content_start, boundary, &part.suffix)
    else {
      break;
    };
    if let Some(regex) = filter {
      if !regex.is_match(&text[content_start..content_end]) {
        break;
      }
    }
    ends.push(boundary);
    pos = boundary;
  }
  ends
}

fn next_slash(text: &str, from: usize) -> usize {
  text[from..].find('/').map(|o| from + o).unwrap_or(text.len())
}

fn strip_prefix_at(text: &str, position: usize, prefix: &str) -> Option<usize> {
  if prefix.is_empty() {
    return Some(position);
  }
  text[position..]
    .starts_with(prefix)
    .then(|| position + prefix.len())
}

/// Position right after the part's suffix when it is present at
/// `content_end`, or `None` when this content length cannot close the
/// part.
fn apply_suffix(text: &str, content_end: usize, suffix: &str) -> Option<usize> {
  if suffix.is_empty() {
    return Some(content_end);
  }
  text[content_end..]
    .starts_with(suffix)
    .then(|| content_end + suffix.len())
}

/// End of the content inside `[content_start, region_end)` once the
/// trailing suffix is accounted for; `None` when the region cannot hold a
/// non-empty content plus the suffix.
fn content_end_before_suffix(
  text: &str,
  content_start: usize,
  region_end: usize,
  suffix: &str,
) -> Option<usize> {
  if region_end <= content_start + suffix.len() {
    return None;
  }
  if suffix.is_empty() {
    return Some(region_end);
  }
  text[content_start..region_end]
    .ends_with(suffix)
    .then(|| region_end - suffix.len())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn hole(
    kind: PartType,
    prefix: &str,
    suffix: &str,
    modifier: PartModifier,
  ) -> Part {
    Part {
      kind,
      component: PatternComponent::Pathname,
      value: String::new(),
      modifier,
      name: "x".to_owned(),
      prefix: prefix.to_owned(),
      suffix: suffix.to_owned(),
    }
  }

  #[test]
  fn next_slash_stops_at_boundary_or_end() {
    assert_eq!(next_slash("/a/b", 1), 2);
    assert_eq!(next_slash("/a/b", 3), 4);
    assert_eq!(next_slash("abc", 0), 3);
  }

  #[test]
  fn strip_prefix_requires_the_literal() {
    assert_eq!(strip_prefix_at("/users", 0, "/"), Some(1));
    assert_eq!(strip_prefix_at("/users", 6, "/"), None);
    assert_eq!(strip_prefix_at("/users", 3, ""), Some(3));
  }

  #[test]
  fn content_end_accounts_for_the_suffix() {
    assert_eq!(content_end_before_suffix("foo.txt", 0, 7, ".txt"), Some(3));
    assert_eq!(content_end_before_suffix("foo.txt", 0, 7, ""), Some(7));
    assert_eq!(content_end_before_suffix(".txt", 0, 4, ".txt"), None);
    assert_eq!(content_end_before_suffix("x", 0, 0, ""), None);
  }

  #[test]
  fn repeated_ends_walk_whole_segments() {
    let part = hole(
      PartType::SegmentWildcard,
      "/",
      "",
      PartModifier::OneOrMore,
    );
    assert_eq!(repeated_ends(&part, None, "/a/bc/d", 0), vec![2, 5, 7]);
    assert_eq!(repeated_ends(&part, None, "nope", 0), Vec::<usize>::new());
  }

  #[test]
  fn repeated_ends_respect_the_regexp_filter() {
    let part = hole(PartType::Regexp, "/", "", PartModifier::OneOrMore);
    let digits = Regex::new("^(?:\\d+)$").unwrap();
    assert_eq!(repeated_ends(&part, Some(&digits), "/1/a/2", 0), vec![2]);
    assert_eq!(
      repeated_ends(&part, Some(&digits), "/1/2", 0),
      vec![2, 4]
    );
  }

  #[test]
  fn repeated_ends_stop_on_missing_prefix() {
    let mut part = hole(
      PartType::SegmentWildcard,
      ".",
      "",
      PartModifier::OneOrMore,
    );
    part.component = PatternComponent::Hostname;
    // Hostname repetitions are unbounded by `/`, so a single repetition
    // swallows the rest of the component.
    assert_eq!(repeated_ends(&part, None, ".a.b", 0), vec![4]);
  }
}
