use hanji::{Environment, TemplateError};
use serde_json::json;

fn render(source: &str, ctx: serde_json::Value) -> Result<String, TemplateError> {
    let env = Environment::new();
    env.template_from_string(source)?.render(ctx)
}

#[test]
fn quick_start() {
    let mut env = Environment::new();
    env.add_template("hello.txt", "Hello {{ name }}!").unwrap();
    let template = env.get_template("hello.txt").unwrap();
    assert_eq!(
        template.render(json!({ "name": "World" })).unwrap(),
        "Hello World!"
    );
}

#[test]
fn filter_chain() {
    assert_eq!(
        render("{{ 'hello'|upper|reverse }}", json!({})).unwrap(),
        "OLLEH"
    );
}

#[test]
fn for_with_loop_variable() {
    let source = "{% for x in [1,2,3] %}{{ loop.index }}:{{ x }}{% if not loop.last %},{% endif %}{% endfor %}";
    assert_eq!(render(source, json!({})).unwrap(), "1:1,2:2,3:3");
}

#[test]
fn inheritance_with_super() {
    let mut env = Environment::new();
    env.add_template("p", "{% block b %}P{% endblock %}").unwrap();
    env.add_template(
        "c",
        "{% extends 'p' %}{% block b %}{{ super() }}+C{% endblock %}",
    )
    .unwrap();
    assert_eq!(env.get_template("c").unwrap().render(()).unwrap(), "P+C");
}

#[test]
fn auto_escape_with_safe() {
    let out = render(
        "{{ a }} {{ b|safe }}",
        json!({ "a": "<x>", "b": "<x>" }),
    )
    .unwrap();
    assert_eq!(out, "&lt;x&gt; <x>");
}

#[test]
fn macro_with_defaults() {
    let source = "{% macro g(n='W') %}Hi {{ n }}{% endmacro %}{{ g() }}|{{ g('A') }}";
    assert_eq!(render(source, json!({})).unwrap(), "Hi W|Hi A");
}

#[test]
fn arithmetic() {
    let source = "{{ 10 // 3 }} {{ 10 / 4 }} {{ 2 ** 3 }} {{ -5 }}";
    assert_eq!(render(source, json!({})).unwrap(), "3 2.5 8 -5");
}

#[test]
fn dictsort_by_value() {
    let source =
        "{% for k,v in {'a':2,'b':1}|dictsort(by='value') %}{{ k }}{% endfor %}";
    assert_eq!(render(source, json!({})).unwrap(), "ba");
}

#[test]
fn division_by_zero() {
    match render("{{ 1 / 0 }}", json!({})) {
        Err(TemplateError::Arithmetic(msg)) => assert!(msg.contains("Division by zero")),
        other => panic!("Expected arithmetic error, got {:?}", other),
    }
}

#[test]
fn ignore_missing_include() {
    assert_eq!(
        render("{% include 'nope' ignore missing %}ok", json!({})).unwrap(),
        "ok"
    );
}

// Universal invariants ----------------------------------------------------

#[test]
fn pure_expressions_are_deterministic() {
    let ctx = json!({ "xs": [3, 1, 2], "s": "Hanji" });
    let source = "{{ xs|sort|join(',') }}/{{ s|lower }}/{{ 2 ** 10 }}";
    let a = render(source, ctx.clone()).unwrap();
    let b = render(source, ctx).unwrap();
    assert_eq!(a, b);
}

#[test]
fn double_reverse_is_identity() {
    assert_eq!(
        render("{{ xs|reverse|reverse|join(',') }}", json!({ "xs": [1, 2, 3] })).unwrap(),
        "1,2,3"
    );
    assert_eq!(
        render("{{ s|reverse|reverse }}", json!({ "s": "hanji" })).unwrap(),
        "hanji"
    );
}

#[test]
fn idempotent_string_filters() {
    for filter in ["trim", "upper", "lower"] {
        let source = format!("{{{{ s|{0} }}}}|{{{{ s|{0}|{0} }}}}", filter);
        let out = render(&source, json!({ "s": "  Mixed Case  " })).unwrap();
        let (once, twice) = out.split_once('|').unwrap();
        assert_eq!(once, twice, "{} is not idempotent", filter);
    }
}

#[test]
fn sort_is_a_non_decreasing_permutation() {
    let out = render(
        "{{ xs|sort|join(',') }}",
        json!({ "xs": [5, 3, 9, 1, 3] }),
    )
    .unwrap();
    assert_eq!(out, "1,3,3,5,9");
}

#[test]
fn unsafe_strings_are_escaped_safe_strings_are_not() {
    let out = render("{{ s }}", json!({ "s": "a<b" })).unwrap();
    assert!(out.contains("&lt;"));
    assert!(!out.contains('<'));
    let out = render("{{ s|safe }}", json!({ "s": "a<b" })).unwrap();
    assert_eq!(out, "a<b");
}

#[test]
fn tojson_round_trips_primitives() {
    let cases = json!({
        "n": null,
        "b": true,
        "i": 42,
        "s": "x\ny",
        "seq": [1, "two"],
        "map": { "k": 1 }
    });
    let out = render("{{ v|tojson }}", json!({ "v": cases.clone() })).unwrap();
    let back: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(back, cases);
}
