// Copyright 2018-2021 the Deno authors. All rights reserved. MIT license.

//! A first-match index over an ordered list of URL patterns.
//!
//! Routes are registered with [`UrlPatternList::add`] together with an
//! arbitrary value, and [`UrlPatternList::exec`] answers which route was
//! registered *first* among those that match a URL, along with the
//! engine's exec result for it. Registration order is the only precedence
//! rule, exactly as if every registered pattern were tested one by one;
//! the index exists so that matching against thousands of routes does not
//! cost thousands of pattern executions.
//!
//! Internally the list keeps a prefix tree over the parsed parts of every
//! registered pattern. The tree walk only ever *filters*: each candidate
//! it produces is confirmed by the `urlpattern` crate before it can win,
//! so capture semantics are always the engine's own.
//!
//! ```
//! use urlpattern_list::StringOrInit;
//! use urlpattern_list::UrlPatternList;
//!
//! let base = Some("http://example.com");
//! let mut routes = UrlPatternList::new();
//! routes
//!   .add(StringOrInit::String("/api/users/:id".to_owned()), base, "user-detail")
//!   .unwrap();
//! routes
//!   .add(StringOrInit::String("/api/users".to_owned()), base, "user-list")
//!   .unwrap();
//!
//! let hit = routes
//!   .exec("http://example.com/api/users/123".to_owned().into(), None)
//!   .unwrap();
//! assert_eq!(*hit.value, "user-detail");
//! ```

mod error;
mod matcher;
mod parser;
mod tokenizer;
mod tree;

pub use error::Error;
pub use urlpattern::quirks::StringOrInit;
pub use urlpattern::quirks::UrlPatternInit;
pub use urlpattern::UrlPatternComponentResult;
pub use urlpattern::UrlPatternResult;

use url::Url;
use urlpattern::quirks;
use urlpattern::UrlPatternOptions;

use crate::matcher::UrlComponent;
use crate::parser::PatternComponent;
use crate::tree::PrefixTree;

/// An append-only collection of URL patterns with first-registration-wins
/// matching.
///
/// `add` takes `&mut self` and `exec`/`test` take `&self`: a list can be
/// shared freely across threads once registration is done, and a single
/// match never mutates the index.
pub struct UrlPatternList<T> {
  tree: PrefixTree<T>,
}

/// Input for [`UrlPatternList::exec`] and [`UrlPatternList::test`]: an
/// already parsed URL, or a string to resolve (against the optional base
/// URL when relative).
#[derive(Debug, Clone)]
pub enum UrlPatternListMatchInput {
  Url(Url),
  String(String),
}

impl From<Url> for UrlPatternListMatchInput {
  fn from(url: Url) -> UrlPatternListMatchInput {
    UrlPatternListMatchInput::Url(url)
  }
}

impl From<String> for UrlPatternListMatchInput {
  fn from(input: String) -> UrlPatternListMatchInput {
    UrlPatternListMatchInput::String(input)
  }
}

impl From<&str> for UrlPatternListMatchInput {
  fn from(input: &str) -> UrlPatternListMatchInput {
    UrlPatternListMatchInput::String(input.to_owned())
  }
}

/// A successful match: the engine's exec result for the winning pattern,
/// plus a reference to the value it was registered with.
pub struct UrlPatternListMatch<'a, T> {
  pub result: UrlPatternResult,
  pub value: &'a T,
}

impl<T> Default for UrlPatternList<T> {
  fn default() -> UrlPatternList<T> {
    UrlPatternList::new()
  }
}

impl<T> std::fmt::Debug for UrlPatternList<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("UrlPatternList")
      .field("patterns", &self.tree.len())
      .field("nodes", &self.tree.node_count())
      .finish()
  }
}

impl<T> UrlPatternList<T> {
  pub fn new() -> UrlPatternList<T> {
    UrlPatternList {
      tree: PrefixTree::new(),
    }
  }

  /// The number of registered patterns.
  pub fn len(&self) -> usize {
    self.tree.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tree.len() == 0
  }

  /// Register a pattern with an associated value.
  ///
  /// Patterns registered earlier always take precedence: for any URL
  /// matched by several registered patterns, [`UrlPatternList::exec`]
  /// returns the one added first. Registration can only fail when the
  /// pattern engine rejects the input, in which case the list is
  /// unchanged.
  pub fn add(
    &mut self,
    input: StringOrInit,
    base_url: Option<&str>,
    value: T,
  ) -> Result<(), Error> {
    let init = quirks::process_construct_pattern_input(input, base_url)?;
    let pattern = urlpattern::UrlPattern::<regex::Regex>::parse(
      init,
      UrlPatternOptions {
        ignore_case: false,
      },
    )?;
    let parts = parser::parse_pattern_parts(&pattern)?;
    let sequence = self.tree.len();
    self.tree.insert(parts, pattern, value);
    tracing::trace!(sequence, "registered url pattern");
    Ok(())
  }

  /// Match a URL against every registered pattern and return the
  /// earliest-registered one that accepts it.
  ///
  /// Returns `None` when the input cannot be resolved to a URL (a string
  /// that does not parse, or a relative string without a usable base) and
  /// when no registered pattern accepts it. Matching never errors and
  /// never mutates the list.
  ///
  /// Backtracking over wildcard consumption lengths is bounded; a match
  /// that exhausts the internal budget (only approachable with adversarial
  /// nests of `*` against very long URLs) is treated as a miss.
  pub fn exec(
    &self,
    input: UrlPatternListMatchInput,
    base_url: Option<&str>,
  ) -> Option<UrlPatternListMatch<'_, T>> {
    let url = match input {
      UrlPatternListMatchInput::Url(url) => url,
      UrlPatternListMatchInput::String(input) => {
        let base_url = match base_url.map(Url::parse) {
          Some(Ok(base_url)) => Some(base_url),
          Some(Err(_)) => return None,
          None => None,
        };
        match Url::options().base_url(base_url.as_ref()).parse(&input) {
          Ok(url) => url,
          Err(_) => return None,
        }
      }
    };
    let components = url_components(&url);
    let best = self.tree.find_best(&url, &components)?;
    Some(UrlPatternListMatch {
      result: best.result,
      value: &self.tree.pattern(best.sequence).value,
    })
  }

  /// Whether any registered pattern accepts the URL. Equivalent to
  /// `exec(..).is_some()`.
  pub fn test(
    &self,
    input: UrlPatternListMatchInput,
    base_url: Option<&str>,
  ) -> bool {
    self.exec(input, base_url).is_some()
  }
}

/// Read the URL's non-empty components in component order. The protocol
/// drops its trailing `:`, search its leading `?` and hash its leading
/// `#`, matching what the engine's component regexes run against.
fn url_components(url: &Url) -> Vec<UrlComponent<'_>> {
  let pairs: [(PatternComponent, &str); 8] = [
    (PatternComponent::Protocol, url.scheme()),
    (PatternComponent::Username, url.username()),
    (
      PatternComponent::Password,
      url.password().unwrap_or_default(),
    ),
    (
      PatternComponent::Hostname,
      url.host_str().unwrap_or_default(),
    ),
    (PatternComponent::Port, url::quirks::port(url)),
    (PatternComponent::Pathname, url::quirks::pathname(url)),
    (PatternComponent::Search, url.query().unwrap_or_default()),
    (PatternComponent::Hash, url.fragment().unwrap_or_default()),
  ];
  let mut components = Vec::with_capacity(4);
  for (component, text) in pairs {
    if !text.is_empty() {
      components.push(UrlComponent { component, text });
    }
  }
  components
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use serde::Deserialize;
  use url::Url;
  use urlpattern::quirks;
  use urlpattern::UrlPatternMatchInput;
  use urlpattern::UrlPatternOptions;

  use super::*;
  use crate::tree::PatternHandle;

  #[derive(Deserialize)]
  struct TestCase {
    name: String,
    #[serde(default)]
    base_url: Option<String>,
    routes: Vec<RouteSpec>,
    tests: Vec<MatchSpec>,
  }

  #[derive(Deserialize)]
  struct RouteSpec {
    pattern: StringOrInit,
    value: String,
  }

  #[derive(Deserialize)]
  struct MatchSpec {
    input: String,
    expected: Option<String>,
    #[serde(default)]
    groups: Option<HashMap<String, HashMap<String, Option<String>>>>,
  }

  fn compile(
    pattern: StringOrInit,
    base_url: Option<&str>,
  ) -> Result<PatternHandle, Error> {
    let init = quirks::process_construct_pattern_input(pattern, base_url)?;
    let pattern = urlpattern::UrlPattern::<regex::Regex>::parse(
      init,
      UrlPatternOptions {
        ignore_case: false,
      },
    )?;
    Ok(pattern)
  }

  fn resolve(input: &str, base_url: Option<&str>) -> Option<Url> {
    let base_url = match base_url.map(Url::parse) {
      Some(Ok(base_url)) => Some(base_url),
      Some(Err(_)) => return None,
      None => None,
    };
    Url::options().base_url(base_url.as_ref()).parse(input).ok()
  }

  /// The reference the index must agree with: walk registrations in
  /// insertion order, return the first the engine accepts.
  fn linear_first_match<'a>(
    reference: &'a [(PatternHandle, String)],
    url: &Url,
  ) -> Option<&'a str> {
    reference.iter().find_map(|(pattern, value)| {
      match pattern.exec(UrlPatternMatchInput::Url(url.clone())) {
        Ok(Some(_)) => Some(value.as_str()),
        _ => None,
      }
    })
  }

  fn component_result<'r>(
    result: &'r UrlPatternResult,
    component: &str,
  ) -> &'r UrlPatternComponentResult {
    match component {
      "protocol" => &result.protocol,
      "username" => &result.username,
      "password" => &result.password,
      "hostname" => &result.hostname,
      "port" => &result.port,
      "pathname" => &result.pathname,
      "search" => &result.search,
      "hash" => &result.hash,
      other => panic!("unknown component {other}"),
    }
  }

  fn run_case(case: TestCase) {
    let base = case.base_url.as_deref();
    let mut list = UrlPatternList::new();
    let mut reference = Vec::new();
    for route in case.routes {
      list
        .add(route.pattern.clone(), base, route.value.clone())
        .unwrap_or_else(|err| {
          panic!("case {}: failed to add route: {err}", case.name)
        });
      reference.push((compile(route.pattern, base).unwrap(), route.value));
    }

    for test in case.tests {
      let hit = list.exec(test.input.as_str().into(), base);
      assert_eq!(
        hit.as_ref().map(|hit| hit.value.as_str()),
        test.expected.as_deref(),
        "case {}: wrong value for {}",
        case.name,
        test.input
      );
      if let Some(url) = resolve(&test.input, base) {
        assert_eq!(
          hit.as_ref().map(|hit| hit.value.as_str()),
          linear_first_match(&reference, &url),
          "case {}: index and linear scan disagree for {}",
          case.name,
          test.input
        );
      }
      if let Some(expected_components) = test.groups {
        let hit = hit.unwrap_or_else(|| {
          panic!("case {}: groups asserted on a miss", case.name)
        });
        for (component, expected_groups) in expected_components {
          let actual = component_result(&hit.result, &component);
          for (name, expected_value) in expected_groups {
            assert_eq!(
              actual.groups.get(&name),
              Some(&expected_value),
              "case {}: group {component}.{name} for {}",
              case.name,
              test.input
            );
          }
        }
      }
    }
  }

  #[test]
  fn test_cases() {
    let testdata = include_str!("./testdata/url_pattern_list_testdata.json");
    let cases: Vec<TestCase> = serde_json::from_str(testdata).unwrap();
    for case in cases {
      run_case(case);
    }
  }

  #[test]
  fn later_routes_never_change_earlier_results() {
    let base = Some("http://example.com");
    let mut list = UrlPatternList::new();
    list
      .add(StringOrInit::String("/x/:a".to_owned()), base, "hole")
      .unwrap();
    assert_eq!(
      list.exec("http://example.com/x/b".into(), None).unwrap().value,
      &"hole"
    );
    // A later, more specific route cannot steal URLs from an earlier one.
    list
      .add(StringOrInit::String("/x/b".to_owned()), base, "literal")
      .unwrap();
    assert_eq!(
      list.exec("http://example.com/x/b".into(), None).unwrap().value,
      &"hole"
    );
    // It still extends the matched set.
    assert_eq!(list.len(), 2);
    assert!(list.test("http://example.com/x/b".into(), None));
  }

  #[test]
  fn unresolvable_inputs_are_misses_not_errors() {
    let mut list = UrlPatternList::new();
    list
      .add(
        StringOrInit::String("/a".to_owned()),
        Some("http://example.com"),
        1,
      )
      .unwrap();
    // A relative string with no base cannot be resolved.
    assert!(list.exec("/a".into(), None).is_none());
    // Neither can garbage, with or without a base.
    assert!(list.exec("http://".into(), None).is_none());
    assert!(list.exec("/a".into(), Some("not a base")).is_none());
    // The same input resolves fine with a usable base.
    assert!(list.exec("/a".into(), Some("http://example.com")).is_some());
  }

  #[test]
  fn rejected_patterns_leave_the_list_unchanged() {
    let base = Some("http://example.com");
    let mut list: UrlPatternList<i32> = UrlPatternList::new();
    list.add(StringOrInit::String("/ok".to_owned()), base, 1).unwrap();
    // An unbalanced regexp group cannot tokenize.
    let err = list
      .add(StringOrInit::String("/bad/(".to_owned()), base, 2)
      .unwrap_err();
    assert!(matches!(err, Error::Pattern(_)));
    assert_eq!(list.len(), 1);
    assert!(list.test("http://example.com/ok".into(), None));
  }

  #[test]
  fn preparsed_urls_are_accepted_directly() {
    let base = Some("http://example.com");
    let mut list = UrlPatternList::new();
    list
      .add(StringOrInit::String("/u/:name".to_owned()), base, "u")
      .unwrap();
    let url = Url::parse("http://example.com/u/ada").unwrap();
    let hit = list.exec(url.into(), None).unwrap();
    assert_eq!(*hit.value, "u");
    let groups = &hit.result.pathname.groups;
    assert_eq!(groups.get("name"), Some(&Some("ada".to_owned())));
  }

  #[test]
  fn pathological_wildcard_nests_terminate_as_a_miss() {
    let mut list = UrlPatternList::new();
    let init = UrlPatternInit {
      protocol: None,
      username: None,
      password: None,
      hostname: None,
      port: None,
      pathname: Some("*a*a*a".to_owned()),
      search: None,
      hash: None,
      base_url: None,
    };
    list.add(StringOrInit::Init(init), None, "greedy").unwrap();
    let long = format!("http://example.com/{}", "a".repeat(400));
    // Three stacked full wildcards against a long path exceed the
    // backtracking budget; the match is abandoned instead of running
    // for a very long time.
    assert!(list.exec(long.as_str().into(), None).is_none());
  }

  #[test]
  fn empty_list_matches_nothing() {
    let list: UrlPatternList<()> = UrlPatternList::new();
    assert!(list.is_empty());
    assert!(list.exec("http://example.com/".into(), None).is_none());
  }
}
