//! End-to-end completion scenarios driven through the public engine API.

use luacomp_core::{Engine, Options, Suggestion};

fn engine() -> Engine {
    Engine::new(Options::default()).expect("engine construction")
}

fn complete(source: &str, manual: bool) -> Vec<Suggestion> {
    engine()
        .complete(source, source.len(), manual)
        .expect("completion request")
}

fn find<'a>(suggestions: &'a [Suggestion], text: &str) -> &'a Suggestion {
    suggestions
        .iter()
        .find(|s| s.text == text)
        .unwrap_or_else(|| panic!("expected suggestion {text:?}"))
}

fn texts(suggestions: &[Suggestion]) -> Vec<&str> {
    suggestions.iter().map(|s| s.text.as_str()).collect()
}

#[test]
fn test_local_variable_in_scope_query() {
    let out = complete("local a = 42\n", true);
    assert_eq!(find(&out, "a").right_label, "number");
    assert_eq!(find(&out, "_G").right_label, "table");
}

#[test]
fn test_member_query_on_constructed_table() {
    let out = complete("a = {foo = 42}\na.bar = 'baz'\na.", false);
    assert_eq!(texts(&out), vec!["bar", "foo"]);
    assert_eq!(find(&out, "foo").right_label, "number");
    assert_eq!(find(&out, "bar").right_label, "string");
}

#[test]
fn test_function_declaration_display() {
    let out = complete("function foo(bar, baz) end\nfoo", true);
    let foo = find(&out, "foo");
    assert_eq!(foo.kind, "function");
    assert_eq!(foo.display_text.as_deref(), Some("foo(bar, baz)"));
    assert_eq!(foo.snippet.as_deref(), Some("foo(${1:bar}, ${2:baz})"));
}

#[test]
fn test_scope_query_inside_method_body() {
    let source = "local a = {}\nfunction a:foo(bar)\n  \nend\n";
    // Cursor inside the method body, before the blank line's newline.
    let offset = source.find("bar)\n  ").expect("fixture") + "bar)\n  ".len();
    let out = engine().complete(source, offset, true).expect("completion");
    for expected in ["_G", "a", "bar", "self"] {
        find(&out, expected);
    }
}

#[test]
fn test_member_query_on_call_result() {
    let out = complete("function foo() return {bar = 42} end\nfoo().", false);
    assert_eq!(texts(&out), vec!["bar"]);
    assert_eq!(find(&out, "bar").right_label, "number");
}

#[test]
fn test_member_query_on_bracket_string_key_entry() {
    let out = complete("a = {[\"foo\"] = 42, [computed] = 1}\na.", false);
    // Only the string-literal key contributes a named member.
    assert_eq!(texts(&out), vec!["foo"]);
    assert_eq!(find(&out, "foo").right_label, "number");
}

#[test]
fn test_statements_inside_loop_bodies_are_analyzed() {
    let source = "local t = {}\n\
                  while true do\n\
                    t.count = 1\n\
                    local inner = 'x'\n\
                  end\n\
                  t.";
    let out = complete(source, false);
    assert_eq!(texts(&out), vec!["count"]);
    assert_eq!(find(&out, "count").right_label, "number");
}

#[test]
fn test_member_query_through_metatable() {
    let source = "local a = {foo = 42}\n\
                  local mt = {__index = {bar = 'baz'}}\n\
                  setmetatable(a, mt)\n\
                  a.";
    let out = complete(source, false);
    assert_eq!(texts(&out), vec!["bar", "foo"]);
    assert_eq!(find(&out, "bar").right_label, "string");
    assert_eq!(find(&out, "foo").right_label, "number");
}

#[test]
fn test_colon_query_filters_to_methods_and_trims_self() {
    let source = "local t = {}\n\
                  function t:go(x) end\n\
                  function t.helper() end\n\
                  t.val = 1\n\
                  t:";
    let out = complete(source, false);
    // Any function-typed member is callable with `:`; non-functions are not.
    assert_eq!(texts(&out), vec!["go", "helper"]);
    let go = find(&out, "go");
    assert_eq!(go.display_text.as_deref(), Some("go(x)"));
    assert_eq!(go.snippet.as_deref(), Some("go(${1:x})"));
}

#[test]
fn test_prefix_narrows_results() {
    let out = complete("local apple = 1\nlocal avocado = 2\nlocal pear = 3\nap", false);
    assert_eq!(texts(&out), vec!["apple"]);
}

#[test]
fn test_stdlib_members_complete() {
    let out = complete("string.", false);
    let upper = find(&out, "upper");
    assert_eq!(upper.kind, "function");
    assert_eq!(upper.display_text.as_deref(), Some("upper(s)"));
}

#[test]
fn test_stdlib_is_not_corrupted_across_sessions() {
    let mut engine = engine();
    // First session writes a member onto a frozen stdlib table.
    let source_a = "string.shout = function(s) end\nstring.";
    let out = engine
        .complete(source_a, source_a.len(), false)
        .expect("first request");
    assert!(out.iter().any(|s| s.text == "shout"));

    // The write was overlay-only, so a later session does not see it.
    let source_b = "string.";
    let out = engine
        .complete(source_b, source_b.len(), false)
        .expect("second request");
    assert!(!out.iter().any(|s| s.text == "shout"));
    assert!(out.iter().any(|s| s.text == "upper"));
}

#[test]
fn test_automatic_activation_needs_prefix_or_accessor() {
    let out = complete("local a = 1\n", false);
    assert!(out.is_empty());
}

#[test]
fn test_parse_never_fails_on_broken_source() {
    let out = complete("local a = {foo = 1}\nif a then\na.", false);
    assert!(out.iter().any(|s| s.text == "foo"));
}

#[test]
fn test_shadowing_local_wins_over_global() {
    let source = "g = 'text'\n\
                  local function inner()\n\
                    local g = {member = 1}\n\
                    g.\n\
                  end\n";
    let offset = source.find("g.\n").expect("fixture") + 2;
    let out = engine().complete(source, offset, false).expect("completion");
    assert_eq!(texts(&out), vec!["member"]);
}

#[test]
fn test_function_argument_types_seed_from_known_signature() {
    // Redeclaring a function whose signature names a table-typed parameter
    // in config would seed it; here the body itself teaches us the shape.
    let source = "local function use(opts)\n  opts.depth = 1\n  opts.\nend\n";
    let offset = source.find("opts.\n").expect("fixture") + "opts.".len();
    let out = engine().complete(source, offset, false).expect("completion");
    assert!(out.iter().any(|s| s.text == "depth"));
}

#[test]
fn test_io_open_returns_named_file_type() {
    let source = "local f = io.open('x.txt', 'r')\nf:";
    let out = complete(source, false);
    assert!(out.iter().any(|s| s.text == "read"));
    assert!(out.iter().any(|s| s.text == "close"));
    // Colon access trims the leading self argument from display.
    let seek = find(&out, "seek");
    assert_eq!(seek.display_text.as_deref(), Some("seek(whence, offset)"));
}

#[test]
fn test_snippets_can_be_disabled() {
    let options = Options {
        use_snippets: false,
        ..Options::default()
    };
    let mut engine = Engine::new(options).expect("engine construction");
    let source = "function foo(bar) end\nfoo";
    let out = engine.complete(source, source.len(), true).expect("completion");
    let foo = find(&out, "foo");
    assert_eq!(foo.display_text.as_deref(), Some("foo(bar)"));
    assert_eq!(foo.snippet, None);
}

#[test]
fn test_multiple_assignment_aligns_types() {
    let out = complete("local x, y = 1, 'two'\ny", true);
    assert_eq!(find(&out, "y").right_label, "string");
}
