#![no_main]
use libfuzzer_sys::arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use urlpattern::quirks;
use urlpattern::UrlPatternMatchInput;
use urlpattern::UrlPatternOptions;
use urlpattern_list::StringOrInit;
use urlpattern_list::UrlPatternList;

#[derive(Arbitrary, Debug)]
struct FuzzInput {
  routes: Vec<String>,
  url: String,
}

const BASE: &str = "https://fuzz.example";

// The index must return exactly what a linear first-match scan over the
// same registrations returns.
fuzz_target!(|input: FuzzInput| {
  let mut list = UrlPatternList::new();
  let mut reference = Vec::new();
  for (value, pattern) in input.routes.iter().take(8).enumerate() {
    // Deep wildcard nests can exhaust the index's backtracking budget,
    // which is a documented miss rather than a real disagreement; keep
    // them out of the equivalence check.
    if pattern.matches('*').count() > 2 {
      continue;
    }
    let route = StringOrInit::String(pattern.clone());
    if list.add(route.clone(), Some(BASE), value).is_ok() {
      let init = quirks::process_construct_pattern_input(route, Some(BASE))
        .expect("list accepted the pattern");
      let compiled = urlpattern::UrlPattern::<regex::Regex>::parse(
        init,
        UrlPatternOptions {
          ignore_case: false,
        },
      )
      .expect("list accepted the pattern");
      reference.push((compiled, value));
    }
  }

  let url = input.url.chars().take(64).collect::<String>();
  let base = url::Url::parse(BASE).unwrap();
  let Ok(url) = url::Url::options().base_url(Some(&base)).parse(&url) else {
    return;
  };

  let indexed = list.exec(url.clone().into(), None).map(|hit| *hit.value);
  let linear = reference.iter().find_map(|(pattern, value)| {
    match pattern.exec(UrlPatternMatchInput::Url(url.clone())) {
      Ok(Some(_)) => Some(*value),
      _ => None,
    }
  });
  assert_eq!(indexed, linear);
});
