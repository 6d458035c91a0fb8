use std::sync::Arc;

use chrono::{FixedOffset, TimeZone};
use metaschema_metapath::model::BoundNode;
use metaschema_metapath::schema::{AssemblyDefinition, FieldDefinition, ModelInstance, ModuleInfo};
use metaschema_metapath::{
    AtomicType, AtomicValue, DynamicContext, DynamicContextBuilder, ErrorCode, Expr, Item, MetapathExpression,
    NodeItem, Sequence, StaticContextBuilder,
};
use rstest::rstest;
use rust_decimal::Decimal;

fn call(local: &str, args: Vec<Expr>) -> Result<Sequence, metaschema_metapath::Error> {
    MetapathExpression::new(local, Expr::call(local, args)).evaluate(&DynamicContext::new(), None)
}

fn atomics(seq: &Sequence) -> Vec<AtomicValue> {
    seq.iter()
        .map(|i| match i {
            Item::Atomic(a) => a.clone(),
            Item::Node(n) => panic!("unexpected node {n:?}"),
        })
        .collect()
}

fn one(local: &str, args: Vec<Expr>) -> AtomicValue {
    let r = call(local, args).unwrap();
    assert_eq!(r.len(), 1, "{local}: {r:?}");
    atomics(&r).remove(0)
}

fn s(v: &str) -> Expr {
    Expr::string(v)
}

fn i(v: i64) -> Expr {
    Expr::integer(v)
}

fn seq(parts: Vec<Expr>) -> Expr {
    Expr::Sequence(parts)
}

fn dec(mantissa: i64, scale: u32) -> Expr {
    Expr::Literal(AtomicValue::Decimal(Decimal::new(mantissa, scale)))
}

fn str_val(v: &str) -> AtomicValue {
    AtomicValue::string(v)
}

#[rstest]
#[case("true", vec![], true)]
#[case("false", vec![], false)]
#[case("not", vec![seq(vec![])], true)]
#[case("not", vec![s("x")], false)]
#[case("boolean", vec![s("0")], true)]
#[case("boolean", vec![i(0)], false)]
#[case("boolean", vec![s("")], false)]
fn boolean_functions(#[case] name: &str, #[case] args: Vec<Expr>, #[case] expected: bool) {
    assert_eq!(one(name, args), AtomicValue::boolean(expected));
}

#[rstest]
#[case("concat", vec![s("a"), i(1), seq(vec![])], "a1")]
#[case("concat", vec![s("a"), s("b"), s("c"), s("d")], "abcd")]
#[case("upper-case", vec![s("abc")], "ABC")]
#[case("lower-case", vec![s("ABC")], "abc")]
#[case("normalize-space", vec![s("  a   b ")], "a b")]
#[case("substring", vec![s("12345"), dec(15, 1), dec(26, 1)], "234")]
#[case("substring", vec![s("motor car"), i(6)], " car")]
#[case("substring", vec![s("12345"), i(0), i(3)], "12")]
#[case("substring", vec![seq(vec![]), i(1)], "")]
#[case("string-join", vec![seq(vec![i(1), i(2), i(3)]), s("-")], "1-2-3")]
#[case("string-join", vec![seq(vec![s("a"), s("b")])], "ab")]
#[case("string", vec![i(42)], "42")]
#[case("string", vec![seq(vec![])], "")]
fn string_functions(#[case] name: &str, #[case] args: Vec<Expr>, #[case] expected: &str) {
    assert_eq!(one(name, args), str_val(expected));
}

#[rstest]
#[case("contains", "tattoo", "t", true)]
#[case("contains", "tattoo", "x", false)]
#[case("starts-with", "tattoo", "tat", true)]
#[case("ends-with", "tattoo", "too", true)]
#[case("ends-with", "tattoo", "tat", false)]
fn substring_tests(#[case] name: &str, #[case] a: &str, #[case] b: &str, #[case] expected: bool) {
    assert_eq!(one(name, vec![s(a), s(b)]), AtomicValue::boolean(expected));
}

fn big(value: Decimal) -> Expr {
    Expr::Literal(AtomicValue::Decimal(value))
}

#[rstest]
#[case(big(Decimal::MAX), big(Decimal::MAX), "")]
#[case(i(2), big(Decimal::MAX), "bc")]
#[case(big(Decimal::MIN), big(Decimal::MIN), "")]
#[case(big(Decimal::MIN), big(Decimal::MAX), "")]
fn substring_with_extreme_bounds(#[case] start: Expr, #[case] length: Expr, #[case] expected: &str) {
    assert_eq!(one("substring", vec![s("abc"), start, length]), str_val(expected));
}

#[rstest]
fn string_length_counts_characters() {
    assert_eq!(one("string-length", vec![s("héllo")]), AtomicValue::Integer(5));
    assert_eq!(one("string-length", vec![seq(vec![])]), AtomicValue::Integer(0));
}

#[rstest]
fn string_functions_require_strings() {
    let err = call("upper-case", vec![i(1)]).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0004);
}

#[rstest]
#[case(vec![s("Hello"), s("^h")], false)]
#[case(vec![s("Hello"), s("^h"), s("i")], true)]
#[case(vec![s("a\nb"), s("^b$"), s("m")], true)]
#[case(vec![s("abc"), s("b")], true)]
fn matches(#[case] args: Vec<Expr>, #[case] expected: bool) {
    assert_eq!(one("matches", args), AtomicValue::boolean(expected));
}

#[rstest]
fn regex_errors() {
    let flags = call("matches", vec![s("a"), s("a"), s("q")]).unwrap_err();
    assert_eq!(flags.code, ErrorCode::FORX0001);
    let pattern = call("matches", vec![s("a"), s("(")]).unwrap_err();
    assert_eq!(pattern.code, ErrorCode::FORX0002);
    let empty_match = call("tokenize", vec![s("abc"), s("x*")]).unwrap_err();
    assert_eq!(empty_match.code, ErrorCode::FORX0002);
}

#[rstest]
#[case(vec![s(" a  b c ")], vec!["a", "b", "c"])]
#[case(vec![s("a, b,c"), s(",\\s*")], vec!["a", "b", "c"])]
#[case(vec![s("1A2a3"), s("a"), s("i")], vec!["1", "2", "3"])]
#[case(vec![s(""), s(",")], vec![])]
#[case(vec![s(",a,"), s(",")], vec!["", "a", ""])]
fn tokenize(#[case] args: Vec<Expr>, #[case] expected: Vec<&str>) {
    let tokens = atomics(&call("tokenize", args).unwrap());
    let expected: Vec<AtomicValue> = expected.into_iter().map(str_val).collect();
    assert_eq!(tokens, expected);
}

#[rstest]
fn cardinality_functions() {
    assert_eq!(one("count", vec![seq(vec![i(1), i(2)])]), AtomicValue::Integer(2));
    assert_eq!(one("empty", vec![seq(vec![])]), AtomicValue::TRUE);
    assert_eq!(one("exists", vec![seq(vec![])]), AtomicValue::FALSE);
    assert_eq!(call("exactly-one", vec![seq(vec![])]).unwrap_err().code, ErrorCode::FORG0005);
    assert_eq!(
        call("zero-or-one", vec![seq(vec![i(1), i(2)])]).unwrap_err().code,
        ErrorCode::FORG0003
    );
    assert_eq!(call("one-or-more", vec![seq(vec![])]).unwrap_err().code, ErrorCode::FORG0004);
    assert_eq!(call("zero-or-one", vec![seq(vec![])]).unwrap().len(), 0);
}

#[rstest]
fn aggregates() {
    assert_eq!(one("sum", vec![seq(vec![i(1), i(2), i(3)])]), AtomicValue::Integer(6));
    assert_eq!(one("sum", vec![seq(vec![])]), AtomicValue::Integer(0));
    assert!(call("sum", vec![seq(vec![]), seq(vec![])]).unwrap().is_empty());
    assert_eq!(
        one("sum", vec![seq(vec![i(1), dec(5, 1)])]),
        AtomicValue::Decimal(Decimal::new(15, 1))
    );
    assert_eq!(call("sum", vec![s("x")]).unwrap_err().code, ErrorCode::XPTY0004);
    assert_eq!(
        one("avg", vec![seq(vec![i(1), i(2)])]),
        AtomicValue::Decimal(Decimal::new(15, 1))
    );
    assert!(call("avg", vec![seq(vec![])]).unwrap().is_empty());
    assert_eq!(one("min", vec![seq(vec![i(3), i(1), i(2)])]), AtomicValue::Integer(1));
    assert_eq!(one("max", vec![seq(vec![i(3), i(1), i(2)])]), AtomicValue::Integer(3));
    assert_eq!(one("max", vec![seq(vec![s("a"), s("b")])]), str_val("b"));
    assert_eq!(
        call("min", vec![seq(vec![i(1), s("a")])]).unwrap_err().code,
        ErrorCode::XPTY0004
    );
}

#[rstest]
fn distinct_values_keep_first_occurrence() {
    let r = call(
        "distinct-values",
        vec![seq(vec![i(1), dec(10, 1), s("1"), i(2), i(1)])],
    )
    .unwrap();
    assert_eq!(
        atomics(&r),
        [AtomicValue::Integer(1), str_val("1"), AtomicValue::Integer(2)]
    );
}

#[rstest]
fn sequence_functions() {
    let r = call("reverse", vec![seq(vec![i(1), i(2), i(3)])]).unwrap();
    assert_eq!(
        atomics(&r),
        [AtomicValue::Integer(3), AtomicValue::Integer(2), AtomicValue::Integer(1)]
    );
    assert_eq!(one("head", vec![seq(vec![i(1), i(2)])]), AtomicValue::Integer(1));
    assert!(call("head", vec![seq(vec![])]).unwrap().is_empty());
    assert_eq!(
        atomics(&call("tail", vec![seq(vec![i(1), i(2), i(3)])]).unwrap()),
        [AtomicValue::Integer(2), AtomicValue::Integer(3)]
    );
}

#[rstest]
#[case("abs", vec![i(-3)], AtomicValue::Integer(3))]
#[case("ceiling", vec![dec(-25, 1)], AtomicValue::Decimal(Decimal::new(-2, 0)))]
#[case("floor", vec![dec(-25, 1)], AtomicValue::Decimal(Decimal::new(-3, 0)))]
#[case("round", vec![dec(25, 1)], AtomicValue::Decimal(Decimal::new(3, 0)))]
#[case("round", vec![dec(-25, 1)], AtomicValue::Decimal(Decimal::new(-2, 0)))]
#[case("round", vec![i(1250), i(-2)], AtomicValue::Integer(1300))]
#[case("round", vec![dec(31415, 4), i(2)], AtomicValue::Decimal(Decimal::new(314, 2)))]
fn numeric_functions(#[case] name: &str, #[case] args: Vec<Expr>, #[case] expected: AtomicValue) {
    assert_eq!(one(name, args), expected);
}

#[rstest]
fn numeric_functions_pass_empty_through() {
    assert!(call("floor", vec![seq(vec![])]).unwrap().is_empty());
    assert_eq!(call("abs", vec![s("1")]).unwrap_err().code, ErrorCode::XPTY0004);
}

#[rstest]
fn current_date_time_uses_the_session_clock() {
    let now = FixedOffset::east_opt(3600)
        .unwrap()
        .with_ymd_and_hms(2024, 5, 6, 7, 8, 9)
        .unwrap();
    let ctx = DynamicContextBuilder::new().with_now(now).build();
    let expr = MetapathExpression::new("current-dateTime()", Expr::call("current-dateTime", vec![]));
    let first = expr.evaluate(&ctx, None).unwrap();
    assert_eq!(first.items(), [Item::Atomic(AtomicValue::DateTimeWithTimezone(now))]);
    let second = expr.evaluate(&ctx, None).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        atomics(&first)[0].as_string(),
        "2024-05-06T07:08:09+01:00"
    );
}

fn catalog() -> NodeItem {
    let module = ModuleInfo::new("cat", "http://example.com/ns/cat");
    let title = FieldDefinition::builder("title", &module).build();
    let part = AssemblyDefinition::builder("part", &module)
        .model(ModelInstance::field(&title))
        .build();
    let catalog: Arc<AssemblyDefinition> = AssemblyDefinition::builder("catalog", &module)
        .model(ModelInstance::assembly(&part).occurs(0, None))
        .model(ModelInstance::field(&title))
        .build();
    let bound = BoundNode::assembly()
        .child("part", BoundNode::assembly().child("title", BoundNode::field("First")))
        .child("part", BoundNode::assembly())
        .child("title", BoundNode::field("Catalog"))
        .build();
    NodeItem::document(&catalog, bound, Some("https://example.com/catalog.json"))
}

fn eval_at(node: &NodeItem, expr: Expr) -> Sequence {
    MetapathExpression::new("<test>", expr)
        .evaluate_at(node.clone(), &DynamicContext::new())
        .unwrap()
}

fn parts() -> Expr {
    Expr::path([Expr::child("catalog"), Expr::child("part")])
}

#[rstest]
fn node_functions_with_argument() {
    let doc = catalog();
    let second = Expr::filter(parts(), i(2));
    assert_eq!(
        atomics(&eval_at(&doc, Expr::call("path", vec![second.clone()]))),
        [str_val("/catalog[1]/part[2]")]
    );
    assert_eq!(
        atomics(&eval_at(&doc, Expr::call("has-children", vec![second]))),
        [AtomicValue::FALSE]
    );
    assert_eq!(
        atomics(&eval_at(&doc, Expr::call("has-children", vec![Expr::filter(parts(), i(1))]))),
        [AtomicValue::TRUE]
    );
    assert!(eval_at(&doc, Expr::call("path", vec![seq(vec![])])).is_empty());
}

#[rstest]
fn node_functions_on_the_context_item() {
    let doc = catalog();
    let part = eval_at(&doc, parts())[0].as_node().unwrap().clone();
    let base = atomics(&eval_at(&part, Expr::call("base-uri", vec![])));
    assert_eq!(base, [AtomicValue::AnyUri("https://example.com/catalog.json".into())]);
    assert!(eval_at(&part, Expr::call("document-uri", vec![])).is_empty());
    let doc_uri = atomics(&eval_at(&doc, Expr::call("document-uri", vec![])));
    assert_eq!(doc_uri[0].type_of(), AtomicType::AnyUri);

    let root = eval_at(&part, Expr::call("root", vec![]));
    assert_eq!(root.items(), [Item::Node(doc.clone())]);
    assert_eq!(
        atomics(&eval_at(&part, Expr::call("string", vec![]))),
        [str_val("First")]
    );
    assert_eq!(
        atomics(&eval_at(&doc, Expr::call("string-length", vec![]))),
        [AtomicValue::Integer(12)]
    );
}

#[rstest]
#[case::node_uri_wins(Some("https://example.com/x.json"), "https://example.com/x.json")]
#[case::static_fallback(None, "https://example.com/static/")]
fn base_uri_falls_back_to_the_static_context(#[case] node_uri: Option<&str>, #[case] expected: &str) {
    let module = ModuleInfo::new("cat", "http://example.com/ns/cat");
    let title = FieldDefinition::builder("title", &module).build();
    let node = NodeItem::orphan_field(&title, BoundNode::field("t").build(), node_uri);
    let statics = StaticContextBuilder::new()
        .with_base_uri("https://example.com/static/")
        .build();
    let ctx = DynamicContextBuilder::new().with_static_context(statics).build();
    let base = MetapathExpression::new("base-uri()", Expr::call("base-uri", vec![]))
        .evaluate_at(node, &ctx)
        .unwrap();
    assert_eq!(atomics(&base), [AtomicValue::AnyUri(expected.into())]);
}

#[rstest]
fn base_uri_without_any_uri_is_empty() {
    let module = ModuleInfo::new("cat", "http://example.com/ns/cat");
    let title = FieldDefinition::builder("title", &module).build();
    let node = NodeItem::orphan_field(&title, BoundNode::field("t").build(), None);
    assert!(eval_at(&node, Expr::call("base-uri", vec![])).is_empty());
}

#[rstest]
fn data_atomizes_nodes() {
    let doc = catalog();
    let titles = Expr::path([Expr::child("catalog"), Expr::child("title")]);
    assert_eq!(
        atomics(&eval_at(&doc, Expr::call("data", vec![titles]))),
        [str_val("Catalog")]
    );
    let err = MetapathExpression::new("data(catalog)", Expr::call("data", vec![Expr::child("catalog")]))
        .evaluate_at(doc, &DynamicContext::new())
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::FOTY0012);
}

#[rstest]
fn node_functions_reject_atomic_arguments() {
    let err = call("path", vec![s("x")]).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0004);
    let err = call("path", vec![]).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPDY0002);
}
