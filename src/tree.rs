// Copyright 2018-2021 the Deno authors. All rights reserved. MIT license.

use regex::Regex;

use crate::parser::Part;
use crate::parser::PartType;

/// The compiled pattern object this index registers and hands back to the
/// engine for confirmation.
pub(crate) type PatternHandle = urlpattern::UrlPattern<regex::Regex>;

/// Nodes live in a single arena owned by the tree and address each other
/// by index, so bulk registration does one vector push per novel part
/// instead of one allocation per node edge.
pub(crate) type NodeId = usize;

pub(crate) const ROOT: NodeId = 0;

/// A pattern registered with the index: the engine handle plus the caller's
/// payload. Its sequence number is its index in the tree's pattern table
/// and is the sole precedence key: the earliest-registered pattern that
/// accepts a URL wins.
pub(crate) struct RegisteredPattern<T> {
  pub pattern: PatternHandle,
  pub value: T,
}

#[derive(Debug)]
pub(crate) enum NodeKind {
  Root,
  Part {
    part: Part,
    /// Compiled once at registration for `Regexp` parts, anchored on both
    /// ends with the source in a non-capturing group. `None` when the
    /// source does not compile under the regex crate; such a node matches
    /// any non-empty content and the engine has the final word.
    regex: Option<Regex>,
  },
}

#[derive(Debug)]
pub(crate) struct Node {
  pub kind: NodeKind,
  /// Sequence numbers of the patterns terminating at this node, in
  /// registration order (so ascending).
  pub patterns: Vec<usize>,
  /// Child nodes in insertion order. Children of one node are pairwise
  /// structurally distinct.
  pub children: Vec<NodeId>,
  /// The lowest sequence number reachable at or below this node. A
  /// subtree whose minimum cannot beat the best candidate found so far is
  /// never walked.
  pub min_sequence: usize,
}

impl Node {
  fn root() -> Node {
    Node {
      kind: NodeKind::Root,
      patterns: vec![],
      children: vec![],
      min_sequence: usize::MAX,
    }
  }

  fn for_part(part: Part) -> Node {
    let regex = if part.kind == PartType::Regexp {
      let compiled = Regex::new(&format!("^(?:{})$", part.value));
      if compiled.is_err() {
        tracing::debug!(
          source = %part.value,
          "part regexp did not compile; node will match permissively"
        );
      }
      compiled.ok()
    } else {
      None
    };
    Node {
      kind: NodeKind::Part { part, regex },
      patterns: vec![],
      children: vec![],
      min_sequence: usize::MAX,
    }
  }

  pub(crate) fn part(&self) -> Option<&Part> {
    match &self.kind {
      NodeKind::Root => None,
      NodeKind::Part { part, .. } => Some(part),
    }
  }
}

/// The match index: a prefix tree over parsed pattern parts, plus the
/// registration table. Nodes are never removed and sequences are never
/// reused; registration only ever appends.
pub(crate) struct PrefixTree<T> {
  nodes: Vec<Node>,
  patterns: Vec<RegisteredPattern<T>>,
}

impl<T> PrefixTree<T> {
  pub(crate) fn new() -> PrefixTree<T> {
    PrefixTree {
      nodes: vec![Node::root()],
      patterns: vec![],
    }
  }

  pub(crate) fn len(&self) -> usize {
    self.patterns.len()
  }

  pub(crate) fn node_count(&self) -> usize {
    self.nodes.len()
  }

  pub(crate) fn node(&self, id: NodeId) -> &Node {
    &self.nodes[id]
  }

  pub(crate) fn pattern(&self, sequence: usize) -> &RegisteredPattern<T> {
    &self.patterns[sequence]
  }

  /// Insert a parsed pattern. Each part either reuses the structurally
  /// equivalent child of the current node or appends a new child; the
  /// walk also folds the new sequence number into `min_sequence` along
  /// the way. Appending is the only structural mutation.
  pub(crate) fn insert(
    &mut self,
    parts: Vec<Part>,
    pattern: PatternHandle,
    value: T,
  ) {
    let sequence = self.patterns.len();
    let mut current = ROOT;
    for part in parts {
      let node = &mut self.nodes[current];
      node.min_sequence = node.min_sequence.min(sequence);
      current = self.find_or_append_child(current, part);
    }
    let node = &mut self.nodes[current];
    node.min_sequence = node.min_sequence.min(sequence);
    node.patterns.push(sequence);
    self.patterns.push(RegisteredPattern { pattern, value });
  }

  fn find_or_append_child(&mut self, parent: NodeId, part: Part) -> NodeId {
    for &child in &self.nodes[parent].children {
      if let Some(existing) = self.nodes[child].part() {
        if existing.same_structure(&part) {
          return child;
        }
      }
    }
    let id = self.nodes.len();
    self.nodes.push(Node::for_part(part));
    self.nodes[parent].children.push(id);
    id
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse_component_string;
  use crate::parser::PatternComponent;

  fn compile(pathname: &str) -> PatternHandle {
    let init = urlpattern::UrlPatternInit {
      protocol: None,
      username: None,
      password: None,
      hostname: None,
      port: None,
      pathname: Some(pathname.to_owned()),
      search: None,
      hash: None,
      base_url: None,
    };
    urlpattern::UrlPattern::<regex::Regex>::parse(
      init,
      urlpattern::UrlPatternOptions { ignore_case: false },
    )
    .unwrap()
  }

  fn insert(tree: &mut PrefixTree<&'static str>, pathname: &'static str) {
    let parts = crate::parser::split_fixed_parts(
      PatternComponent::Pathname,
      parse_component_string(PatternComponent::Pathname, pathname).unwrap(),
    );
    tree.insert(parts, compile(pathname), pathname);
  }

  fn check_min_sequences<T>(tree: &PrefixTree<T>, id: NodeId) -> usize {
    let node = tree.node(id);
    let mut min = node.patterns.iter().copied().min().unwrap_or(usize::MAX);
    for &child in &node.children {
      min = min.min(check_min_sequences(tree, child));
    }
    assert_eq!(node.min_sequence, min, "node {id} summary out of sync");
    min
  }

  #[test]
  fn equivalent_prefixes_share_nodes() {
    let mut tree = PrefixTree::new();
    insert(&mut tree, "/books/:id");
    let nodes_after_first = tree.node_count();
    insert(&mut tree, "/books/:bookId");
    // Only the capture name differs, which is structurally irrelevant:
    // no new node may appear.
    assert_eq!(tree.node_count(), nodes_after_first);
    check_min_sequences(&tree, ROOT);
  }

  #[test]
  fn diverging_suffixes_append_children() {
    let mut tree = PrefixTree::new();
    insert(&mut tree, "/:section/:title.txt");
    insert(&mut tree, "/:section/:title.html");
    // Shared: the two holes. Distinct: the trailing literals.
    let root_children = tree.node(ROOT).children.len();
    assert_eq!(root_children, 1);
    check_min_sequences(&tree, ROOT);
  }

  #[test]
  fn terminal_patterns_accumulate_in_registration_order() {
    let mut tree = PrefixTree::new();
    insert(&mut tree, "/books/:id");
    insert(&mut tree, "/books/:bookId");
    let mut terminal = ROOT;
    while tree.node(terminal).patterns.is_empty() {
      terminal = tree.node(terminal).children[0];
    }
    assert_eq!(tree.node(terminal).patterns, vec![0, 1]);
  }

  #[test]
  fn min_sequence_summarizes_the_whole_subtree() {
    let mut tree = PrefixTree::new();
    insert(&mut tree, "/a/b/c");
    insert(&mut tree, "/a/b");
    insert(&mut tree, "/a");
    check_min_sequences(&tree, ROOT);
    // The `/a` node sits on every path, so it carries the first
    // registration's sequence.
    let a = tree.node(ROOT).children[0];
    assert_eq!(tree.node(a).min_sequence, 0);
  }

  #[test]
  fn invalid_regexp_source_is_kept_permissive() {
    // Lookahead is valid for the engine's ECMA regexp flavor reference
    // but not for the regex crate; the node must survive with no
    // compiled regexp rather than fail registration.
    let part_list =
      parse_component_string(PatternComponent::Pathname, "/:id(a(?=b))")
        .unwrap();
    let regexp_part = part_list
      .into_iter()
      .find(|p| p.kind == crate::parser::PartType::Regexp)
      .unwrap();
    let node = Node::for_part(regexp_part);
    match node.kind {
      NodeKind::Part { regex, .. } => assert!(regex.is_none()),
      NodeKind::Root => unreachable!(),
    }
  }
}
