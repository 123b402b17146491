//! End-to-end page scenarios: calculated greeting state and the weekday
//! switch, driven through the real loader, evaluator and renderer.

use chrono::NaiveDate;
use lingo::{render, Element, HostRegistry, LingoApp};
use mapp_core::{Ctx, Record, Value};

const GREETING_PAGE: &str = r#"
lingo:
  version: page-beta-1
page:
  name: welcome
  state:
    name: { type: str, examples: ["Alice"] }
    greeting:
      type: str
      examples: ["Welcome in, "]
      calc:
        branch:
          - if: { args: { first_visit: {} } }
            then: { text: "Welcome back, " }
          - else: { text: "Welcome in, " }
  args:
    first_visit: { type: bool, examples: [true] }
  document:
    - heading: { text: "Welcome", level: 1 }
    - menu:
        - { text: "home", link: "/" }
        - { text: "about", link: "/about" }
    - break: { count: 1 }
    - lingo: { state: { greeting: {} } }
    - lingo: { state: { name: {} } }
"#;

fn texts(elements: &[Element]) -> Vec<String> {
    elements
        .iter()
        .filter_map(|e| match e {
            Element::Text { text } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn greeting_branch_picks_returning_visitor() {
    let program = lingo::load_page_str(GREETING_PAGE, false).unwrap();
    let mut app = LingoApp::new(program);

    let mut args = Record::new();
    args.insert("first_visit".to_string(), Value::Bool(true));
    app.bind_args(args).unwrap();
    app.write_state("name", Value::Str("Alice".to_string())).unwrap();

    let registry = HostRegistry::standard();
    let elements = render(&mut app, &Ctx::new(), &registry).unwrap();

    // The two trailing text elements are the greeting pair.
    assert_eq!(
        texts(&elements),
        vec!["Welcome back, ".to_string(), "Alice".to_string()]
    );
}

#[test]
fn greeting_branch_falls_back_for_new_visitor() {
    let program = lingo::load_page_str(GREETING_PAGE, false).unwrap();
    let mut app = LingoApp::new(program);

    let mut args = Record::new();
    args.insert("first_visit".to_string(), Value::Bool(false));
    app.bind_args(args).unwrap();
    app.write_state("name", Value::Str("Alice".to_string())).unwrap();

    let registry = HostRegistry::standard();
    let elements = render(&mut app, &Ctx::new(), &registry).unwrap();
    assert_eq!(
        texts(&elements),
        vec!["Welcome in, ".to_string(), "Alice".to_string()]
    );
}

const WEEKDAY_PAGE: &str = r#"
lingo:
  version: page-beta-1
page:
  name: today
  document:
    - switch:
        expression: { call: { func: date.weekday, args: {} } }
        cases:
          - { case: 0, then: { text: "Monday" } }
          - { case: 1, then: { text: "Tuesday" } }
          - { case: 2, then: { text: "Wednesday" } }
          - { case: 3, then: { text: "Thursday" } }
          - { case: 4, then: { text: "Friday" } }
        default: { text: "Weekend" }
"#;

#[test]
fn weekday_switch_with_pinned_clock() {
    let program = lingo::load_page_str(WEEKDAY_PAGE, false).unwrap();
    let mut app = LingoApp::new(program);

    // 2024-01-03 is a Wednesday.
    let wednesday = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap().and_hms_opt(9, 0, 0).unwrap();
    let ctx = Ctx::fixed(wednesday, 0);
    let registry = HostRegistry::standard();

    let elements = render(&mut app, &ctx, &registry).unwrap();
    assert_eq!(elements, vec![Element::Text { text: "Wednesday".to_string() }]);
}

#[test]
fn weekday_switch_defaults_on_weekend() {
    let program = lingo::load_page_str(WEEKDAY_PAGE, false).unwrap();
    let mut app = LingoApp::new(program);

    // 2024-01-06 is a Saturday.
    let saturday = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap().and_hms_opt(9, 0, 0).unwrap();
    let ctx = Ctx::fixed(saturday, 0);
    let registry = HostRegistry::standard();

    let elements = render(&mut app, &ctx, &registry).unwrap();
    assert_eq!(elements, vec![Element::Text { text: "Weekend".to_string() }]);
}
