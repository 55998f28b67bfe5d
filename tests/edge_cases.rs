use hanji::{Environment, TemplateError, Value};
use serde_json::json;

fn render(source: &str, ctx: serde_json::Value) -> Result<String, TemplateError> {
    let env = Environment::new();
    env.template_from_string(source)?.render(ctx)
}

#[test]
fn three_level_inheritance_composes_sibling_blocks() {
    let mut env = Environment::new();
    env.add_template(
        "base",
        "[{% block one %}base-one{% endblock %}|{% block two %}base-two{% endblock %}]",
    )
    .unwrap();
    env.add_template(
        "middle",
        "{% extends 'base' %}{% block two %}middle-two{% endblock %}",
    )
    .unwrap();
    env.add_template(
        "child",
        "{% extends 'middle' %}{% block one %}child-one{% endblock %}",
    )
    .unwrap();
    assert_eq!(
        env.get_template("child").unwrap().render(()).unwrap(),
        "[child-one|middle-two]"
    );
}

#[test]
fn super_climbs_one_level_per_call() {
    let mut env = Environment::new();
    env.add_template("gp", "{% block b %}G{% endblock %}").unwrap();
    env.add_template(
        "p",
        "{% extends 'gp' %}{% block b %}P {{ super() }}{% endblock %}",
    )
    .unwrap();
    env.add_template(
        "c",
        "{% extends 'p' %}{% block b %}C {{ super() }}{% endblock %}",
    )
    .unwrap();
    // Every level overrides the same block and calls super(): the child
    // sees the parent, the parent's own super() sees the grandparent.
    assert_eq!(env.get_template("c").unwrap().render(()).unwrap(), "C P G");
    // The middle template renders the same way on its own.
    assert_eq!(env.get_template("p").unwrap().render(()).unwrap(), "P G");
}

#[test]
fn super_repeats_the_same_ancestor_within_one_body() {
    let mut env = Environment::new();
    env.add_template("base", "{% block b %}x{% endblock %}").unwrap();
    env.add_template(
        "page",
        "{% extends 'base' %}{% block b %}{{ super() }}{{ super() }}{% endblock %}",
    )
    .unwrap();
    assert_eq!(env.get_template("page").unwrap().render(()).unwrap(), "xx");
}

#[test]
fn extends_target_can_be_an_expression() {
    let mut env = Environment::new();
    env.add_template("layout-a", "A:{% block b %}?{% endblock %}")
        .unwrap();
    env.add_template(
        "page",
        "{% extends 'layout-' ~ which %}{% block b %}x{% endblock %}",
    )
    .unwrap();
    assert_eq!(
        env.get_template("page")
            .unwrap()
            .render(json!({ "which": "a" }))
            .unwrap(),
        "A:x"
    );
}

#[test]
fn super_outside_a_block_is_empty() {
    assert_eq!(render("a{{ super() }}b", json!({})).unwrap(), "ab");
}

#[test]
fn include_sees_the_current_scope() {
    let mut env = Environment::new();
    env.add_template("part", "{{ greeting }}, {{ who }}").unwrap();
    env.add_template(
        "page",
        "{% set who = 'World' %}{% include 'part' %}",
    )
    .unwrap();
    assert_eq!(
        env.get_template("page")
            .unwrap()
            .render(json!({ "greeting": "Hi" }))
            .unwrap(),
        "Hi, World"
    );
}

#[test]
fn missing_include_without_ignore_fails() {
    let mut env = Environment::new();
    env.add_template("page", "{% include 'gone' %}").unwrap();
    match env.get_template("page").unwrap().render(()) {
        Err(TemplateError::UnknownName(msg)) => assert!(msg.contains("gone")),
        other => panic!("Expected unknown name error, got {:?}", other),
    }
}

#[test]
fn import_binds_a_module() {
    let mut env = Environment::new();
    env.add_template(
        "helpers",
        "{% macro badge(n) %}[{{ n }}]{% endmacro %}{% set version = 3 %}",
    )
    .unwrap();
    env.add_template(
        "page",
        "{% import 'helpers' as h %}{{ h.badge('new') }}v{{ h.version }}",
    )
    .unwrap();
    assert_eq!(
        env.get_template("page").unwrap().render(()).unwrap(),
        "[new]v3"
    );
}

#[test]
fn from_import_copies_and_aliases() {
    let mut env = Environment::new();
    env.add_template(
        "helpers",
        "{% macro badge(n) %}[{{ n }}]{% endmacro %}{% macro tag(n) %}<{{ n }}>{% endmacro %}",
    )
    .unwrap();
    env.add_template(
        "page",
        "{% from 'helpers' import badge, tag as t %}{{ badge(1) }}{{ t('b') }}",
    )
    .unwrap();
    assert_eq!(
        env.get_template("page").unwrap().render(()).unwrap(),
        "[1]<b>"
    );
}

#[test]
fn from_import_of_a_missing_name_fails() {
    let mut env = Environment::new();
    env.add_template("helpers", "x").unwrap();
    env.add_template("page", "{% from 'helpers' import nope %}")
        .unwrap();
    assert!(env.get_template("page").unwrap().render(()).is_err());
}

#[test]
fn call_block_binds_caller() {
    let source = "{% macro wrap() %}({{ caller(7) }}){% endmacro %}\
                  {% call(n) wrap() %}n={{ n }}{% endcall %}";
    assert_eq!(render(source, json!({})).unwrap(), "(n=7)");
}

#[test]
fn macro_varargs_and_kwargs() {
    let source = "{% macro m(a) %}{{ a }}/{{ varargs|join(',') }}/{{ kwargs.x }}{% endmacro %}\
                  {{ m(1, 2, 3, x=9) }}";
    assert_eq!(render(source, json!({})).unwrap(), "1/2,3/9");
}

#[test]
fn keyword_arguments_override_positionals() {
    let source = "{% macro m(a, b='B') %}{{ a }}{{ b }}{% endmacro %}{{ m('x', a='y') }}";
    assert_eq!(render(source, json!({})).unwrap(), "yB");
}

#[test]
fn filter_block_applies_to_the_rendered_body() {
    let source = "{% filter upper %}a{{ 'b' }}c{% endfilter %}";
    assert_eq!(render(source, json!({})).unwrap(), "ABC");
}

#[test]
fn with_scope_is_released() {
    let source = "{% with a=1, b=a+1 %}{{ a }}{{ b }}{% endwith %}{{ a }}";
    assert_eq!(render(source, json!({})).unwrap(), "12");
}

#[test]
fn set_writes_the_innermost_scope() {
    let source = "{% for x in [1] %}{% set inner = 9 %}{{ inner }}{% endfor %}{{ inner }}";
    assert_eq!(render(source, json!({})).unwrap(), "9");
}

#[test]
fn for_else_runs_on_empty_and_filtered_out() {
    assert_eq!(
        render("{% for x in [] %}{{ x }}{% else %}none{% endfor %}", json!({})).unwrap(),
        "none"
    );
    assert_eq!(
        render(
            "{% for x in [1, 2] if x > 5 %}{{ x }}{% else %}none{% endfor %}",
            json!({})
        )
        .unwrap(),
        "none"
    );
}

#[test]
fn for_filter_keeps_matching_items() {
    assert_eq!(
        render(
            "{% for x in [1, 2, 3, 4] if x % 2 == 0 %}{{ x }}{% endfor %}",
            json!({})
        )
        .unwrap(),
        "24"
    );
}

#[test]
fn tuple_targets_unpack_with_none_padding() {
    assert_eq!(
        render(
            "{% for a, b in [[1, 2], [3]] %}{{ a }}-{{ b }};{% endfor %}",
            json!({})
        )
        .unwrap(),
        "1-2;3-none;"
    );
}

#[test]
fn iterating_a_map_yields_keys_in_insertion_order() {
    // serde_json objects arrive sorted; build the map in-template instead.
    assert_eq!(
        render("{% for k in {'b':1,'a':2} %}{{ k }}{% endfor %}", json!({})).unwrap(),
        "ba"
    );
    assert_eq!(
        render(
            "{% for pair in {'b':1,'a':2}|items %}{{ pair.0 }}={{ pair.1 }};{% endfor %}",
            json!({})
        )
        .unwrap(),
        "b=1;a=2;"
    );
}

#[test]
fn loop_cycle_and_changed() {
    assert_eq!(
        render(
            "{% for x in [1,2,3,4] %}{{ loop.cycle('a','b') }}{% endfor %}",
            json!({})
        )
        .unwrap(),
        "abab"
    );
    assert_eq!(
        render(
            "{% for x in [1,1,2] %}{{ loop.changed(x) }};{% endfor %}",
            json!({})
        )
        .unwrap(),
        "true;false;true;"
    );
}

#[test]
fn strings_iterate_as_characters() {
    assert_eq!(
        render("{% for c in 'abc' %}{{ c }}.{% endfor %}", json!({})).unwrap(),
        "a.b.c."
    );
}

#[test]
fn conditional_expression_and_optional_else() {
    assert_eq!(
        render("{{ 'yes' if ok else 'no' }}", json!({ "ok": true })).unwrap(),
        "yes"
    );
    assert_eq!(
        render("{{ 'yes' if ok else 'no' }}", json!({ "ok": false })).unwrap(),
        "no"
    );
    // Without an else arm the expression is undefined, which emits nothing.
    assert_eq!(render("[{{ 'yes' if ok }}]", json!({ "ok": false })).unwrap(), "[]");
}

#[test]
fn indexing_and_slicing() {
    let ctx = json!({ "xs": [10, 20, 30, 40], "s": "hanji" });
    assert_eq!(render("{{ xs[1] }}", ctx.clone()).unwrap(), "20");
    assert_eq!(render("{{ xs[-1] }}", ctx.clone()).unwrap(), "40");
    assert_eq!(render("{{ xs[1:3]|join(',') }}", ctx.clone()).unwrap(), "20,30");
    assert_eq!(render("{{ xs[::2]|join(',') }}", ctx.clone()).unwrap(), "10,30");
    assert_eq!(render("{{ s[1] }}", ctx.clone()).unwrap(), "a");
    assert_eq!(render("{{ s[::-1] }}", ctx).unwrap(), "ijnah");
}

#[test]
fn membership_and_concat() {
    assert_eq!(
        render("{{ 'an' in 'hanji' }}/{{ 3 in [1,2] }}", json!({})).unwrap(),
        "true/false"
    );
    assert_eq!(render("{{ 'a' ~ 1 ~ none }}", json!({})).unwrap(), "a1none");
}

#[test]
fn tests_in_templates() {
    let ctx = json!({ "n": 4, "s": "abc" });
    assert_eq!(
        render(
            "{{ n is even }}/{{ n is divisibleby(2) }}/{{ s is defined }}/{{ t is defined }}",
            ctx.clone()
        )
        .unwrap(),
        "true/true/true/false"
    );
    assert_eq!(
        render("{{ n is not string }}/{{ s is lower }}", ctx).unwrap(),
        "true/true"
    );
    assert_eq!(render("{{ 1 is == 1 }}", json!({})).unwrap(), "true");
}

#[test]
fn unknown_test_and_filter_fail() {
    assert!(matches!(
        render("{{ 1 is sparkly }}", json!({})),
        Err(TemplateError::UnknownName(_))
    ));
    assert!(matches!(
        render("{{ 1|sparkly }}", json!({})),
        Err(TemplateError::UnknownName(_))
    ));
}

#[test]
fn cycler_joiner_and_namespace() {
    let source = "{% set c = cycler('x', 'y') %}{{ c.next() }}{{ c.next() }}{{ c.next() }}";
    assert_eq!(render(source, json!({})).unwrap(), "xyx");

    let source = "{% set j = joiner('; ') %}{% for x in [1,2,3] %}{{ j() }}{{ x }}{% endfor %}";
    assert_eq!(render(source, json!({})).unwrap(), "1; 2; 3");

    let source = "{% set ns = namespace(total=0) %}\
                  {% for x in [1,2,3] %}{% set ns.total = ns.total + x %}{% endfor %}\
                  {{ ns.total }}";
    assert_eq!(render(source, json!({})).unwrap(), "6");
}

#[test]
fn raw_and_whitespace_control() {
    assert_eq!(
        render("{% raw %}{{ untouched }}{% endraw %}", json!({})).unwrap(),
        "{{untouched}}"
    );
    assert_eq!(
        render("x  {%- if true -%}  y  {%- endif %}", json!({})).unwrap(),
        "xy"
    );
}

#[test]
fn autoescape_block_renders_unchanged() {
    assert_eq!(
        render(
            "{% autoescape false %}{{ s }}{% endautoescape %}",
            json!({ "s": "<x>" })
        )
        .unwrap(),
        "&lt;x&gt;"
    );
}

#[test]
fn keywords_are_recognized_case_insensitively() {
    assert_eq!(
        render("{% IF true %}{% FOR x IN [1,2] %}{{ x }}{% ENDFOR %}{% ENDIF %}", json!({}))
            .unwrap(),
        "12"
    );
}

fn custom_upper(
    v: &Value,
    _: &[Value],
    _: &hanji::Kwargs,
    _: &mut hanji::State<'_>,
) -> Result<Value, TemplateError> {
    Ok(Value::string(format!("custom:{}", v)))
}

fn always_odd(_: &Value, _: &[Value]) -> Result<bool, TemplateError> {
    Ok(true)
}

fn custom_range(
    _: &[Value],
    _: &hanji::Kwargs,
    _: &mut hanji::State<'_>,
) -> Result<Value, TemplateError> {
    Ok(Value::string("custom-range"))
}

#[test]
fn user_extensions_shadow_builtins() {
    let mut env = Environment::new();
    env.add_filter("upper", custom_upper);
    env.add_test("odd", always_odd);
    env.add_function("range", custom_range);
    env.add_global("site", Value::from("hanji"));
    let out = env
        .template_from_string("{{ 'x'|upper }}/{{ 2 is odd }}/{{ range(3) }}/{{ site }}")
        .unwrap()
        .render(())
        .unwrap();
    assert_eq!(out, "custom:x/true/custom-range/hanji");
}

#[test]
fn no_partial_output_on_error() {
    let env = Environment::new();
    let template = env
        .template_from_string("before {{ 1 / 0 }} after")
        .unwrap();
    match template.render(()) {
        Err(TemplateError::Arithmetic(_)) => {}
        other => panic!("Expected arithmetic error, got {:?}", other),
    }
}

#[test]
fn emitted_maps_and_seqs_are_stringified() {
    let out = render("{{ {'b': 1, 'a': 'x'} }}", json!({})).unwrap();
    // Map repr sorts keys; the quotes are then HTML-escaped on emission.
    assert_eq!(out, "{&quot;a&quot;: &quot;x&quot;, &quot;b&quot;: 1}");
    assert_eq!(render("{{ [1, 'a'] }}", json!({})).unwrap(), "[1, &quot;a&quot;]");
}

#[test]
fn comments_are_dropped_with_whitespace_control() {
    assert_eq!(
        render("a {#- note -#} b", json!({})).unwrap(),
        "ab"
    );
}

#[test]
fn nested_loops_have_independent_loop_objects() {
    let out = render(
        "{% for a in [1,2] %}{% for b in [1,2] %}{{ loop.index }}{% endfor %}|{{ loop.index }};{% endfor %}",
        json!({}),
    )
    .unwrap();
    assert_eq!(out, "12|1;12|2;");
}

#[test]
fn macros_can_call_other_macros() {
    let source = "{% macro inner(x) %}<{{ x }}>{% endmacro %}\
                  {% macro outer(x) %}[{{ inner(x) }}]{% endmacro %}\
                  {{ outer(1) }}";
    assert_eq!(render(source, json!({})).unwrap(), "[<1>]");
}

#[test]
fn filter_block_with_arguments() {
    let source = "{% filter replace('o', '0') %}foo{% endfilter %}";
    assert_eq!(render(source, json!({})).unwrap(), "f00");
}

#[test]
fn loop_previtem_and_nextitem_are_none() {
    let out = render(
        "{% for x in [1] %}[{{ loop.previtem }}|{{ loop.nextitem }}]{% endfor %}",
        json!({}),
    )
    .unwrap();
    // none is suppressed on emission.
    assert_eq!(out, "[|]");
}

#[test]
fn number_formatting_in_output() {
    assert_eq!(render("{{ 8.0 }}", json!({})).unwrap(), "8.0");
    assert_eq!(render("{{ 7.5 // 2 }}", json!({})).unwrap(), "3");
    assert_eq!(render("{{ 7 % 3 }}/{{ -7 % 3 }}", json!({})).unwrap(), "1/2");
    assert_eq!(render("{{ 2 ** -1 }}", json!({})).unwrap(), "0.5");
}
