//! Runs generated programs in QuickJS.

use rquickjs::{Context, Runtime};
use ten_compiler::library::NoIncludes;
use ten_compiler::{Compiler, Config, Library, MemoryLoader, Registry, UnitSource};

fn eval(script: &str) -> String {
    let rt = Runtime::new().unwrap();
    let ctx = Context::full(&rt).unwrap();
    ctx.with(|ctx| ctx.eval::<String, _>(script.to_string()).unwrap())
}

fn render(src: &str, data: &str) -> String {
    let c = ten_compiler::compile(src).unwrap();
    assert!(!c.has_errors(), "{:?}", c.diagnostics);
    eval(&format!("({}).call({data}, {{}}, null, null)", c.program))
}

#[test]
fn plain_text_round_trips() {
    let src = "<p class=\"a\">\"quoted\" \\ </script>\n\tend</p>";
    assert_eq!(render(src, "{}"), src);
}

#[test]
fn entities_read_the_data() {
    assert_eq!(
        render("Hello, &ten.user.name;!", r#"{"user": {"name": "World"}}"#),
        "Hello, World!"
    );
    assert_eq!(render("[&ten.;]", "7"), "[7]");
}

#[test]
fn each_over_array_and_object() {
    let src = "<ten:each array=\"[10, 20, 30]\" item=\"x\"><ten:echo data=\"_index\"/>:<ten:echo data=\"x\"/>;</ten:each>";
    assert_eq!(render(src, "{}"), "0:10;1:20;2:30;");

    let src = "<ten:each object=\"this.o\" item=\"v\"><ten:echo data=\"_property\"/>=<ten:echo data=\"v\"/>,</ten:each>";
    assert_eq!(render(src, r#"{"o": {"a": 1, "b": 2}}"#), "a=1,b=2,");
}

#[test]
fn conditional_branches() {
    let src = "<ten:if test=\"this.n > 1\">big<ten:else if=\"this.n == 1\"/>one<ten:else/>none</ten:if>";
    assert_eq!(render(src, r#"{"n": 2}"#), "big");
    assert_eq!(render(src, r#"{"n": 1}"#), "one");
    assert_eq!(render(src, r#"{"n": 0}"#), "none");
    assert_eq!(render("<ten:unless>empty</ten:unless>", "0"), "empty");
}

#[test]
fn echo_escapes_at_runtime_and_when_folded() {
    let src = "<ten:echo data=\"this.s\" escape=\"html\"/>|<ten:echo data='\"&lt;b&gt;\"' escape=\"html\"/>";
    assert_eq!(
        render(src, r#"{"s": "<a href=\"x\">&</a>"}"#),
        "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;|&lt;b&gt;"
    );
    assert_eq!(
        render("<ten:echo data=\"this.o\" format=\"json\"/>", r#"{"o": {"a": [1]}}"#),
        r#"{"a":[1]}"#
    );
    assert_eq!(
        render("<ten:echo escape=\"url\"/>", r#""a b/ü""#),
        "a%20b/%C3%BC"
    );
    assert_eq!(render("<ten:echo escape=\"js\"/>", r#""it's""#), "it\\'s");
}

#[test]
fn data_context_and_comment() {
    let src = "<ten:data name=\"greeting\">Hi &ten.name;</ten:data><ten:data name=\"twice\" value=\"this.n * 2\"/><ten:echo data=\"_data.greeting\"/> <ten:echo data=\"_data.twice\"/>";
    assert_eq!(render(src, r#"{"name": "Bob", "n": 4}"#), "Hi Bob 8");

    let src = "<ten:context object=\"this.user\">&ten.name;</ten:context><ten:comment>hidden</ten:comment>";
    assert_eq!(render(src, r#"{"user": {"name": "Ann"}}"#), "Ann");
}

#[test]
fn named_templates() {
    let src = "<ten:template name=\"hi\">Hi &ten.name;</ten:template><ten:include name=\"hi\"/>!";
    assert_eq!(render(src, r#"{"name": "Ann"}"#), "Hi Ann!");
}

#[test]
fn unit_context_rebinds_this() {
    let registry = Registry::standard();
    let compiler = Compiler::new(&registry, Config::default()).unwrap();
    let unit = UnitSource {
        context: Some("this.user"),
        ..UnitSource::inline("&ten.name;")
    };
    let c = compiler.compile_unit(unit, &mut NoIncludes);
    let script = format!("({}).call({{\"user\": {{\"name\": \"Eve\"}}}}, {{}}, null, null)", c.program);
    assert_eq!(eval(&script), "Eve");
}

#[test]
fn streaming_writes_chunks_at_scope_boundaries() {
    let c = ten_compiler::compile("a<ten:each array=\"[1, 2]\">b</ten:each>c").unwrap();
    let script = format!(
        concat!(
            "(function () {{",
            "var chunks = [];",
            "var sink = {{ write: function (s) {{ chunks.push(s); }} }};",
            "var out = ({}).call({{}}, {{}}, sink, null);",
            "return JSON.stringify([out, chunks]);",
            "}})()"
        ),
        c.program
    );
    assert_eq!(eval(&script), r#"["",["a","bb","c"]]"#);
}

#[test]
fn bundle_renders_includes_with_shared_templates() {
    let loader = MemoryLoader::new()
        .with(
            "main.ten",
            "<ten:template name=\"em\">*&ten.;*</ten:template><h1>&ten.title;</h1><ten:include src=\"parts/item.ten\"/>",
        )
        .with(
            "parts/item.ten",
            "<p><ten:context object=\"this.title\"><ten:include name=\"em\"/></ten:context></p>",
        );
    let registry = Registry::standard();
    let compiler = Compiler::new(&registry, Config::default()).unwrap();
    let mut library = Library::new(compiler, loader);
    assert!(!library.load("main.ten").unwrap().has_errors());

    let bundle = library.bundle("main.ten").unwrap();
    let script = format!("({bundle})({{\"title\": \"T\"}}, null)");
    assert_eq!(eval(&script), "<h1>T</h1><p>*T*</p>");
}

#[test]
fn escapes_agree_between_folded_and_runtime_paths() {
    // `& < > " ' \ LF CRLF U+2028`, once as a literal and once as data
    let literal = r#"'"&amp; &lt; &gt; \" &apos; \\ \n \r\n \u2028"'"#;
    let data = r#"{"s": "& < > \" ' \\ \n \r\n \u2028"}"#;
    for escape in ["js", "url", "html", "htmlDec", "htmlHex"] {
        let src = format!("<ten:echo data={literal} escape=\"{escape}\"/>");
        assert!(!ten_compiler::compile(&src).unwrap().program.contains("String("));
        let folded = render(&src, "{}");
        let runtime = render(&format!("<ten:echo data=\"this.s\" escape=\"{escape}\"/>"), data);
        assert_eq!(folded, runtime, "escape {escape}");
    }

    assert_eq!(
        render("<ten:echo escape=\"htmlDec\"/>", r#""&<>\"""#),
        "&#38;&#60;&#62;&#34;"
    );
    assert_eq!(
        render(r#"<ten:echo data='"&amp;&lt;&gt;\""' escape="htmlDec"/>"#, "{}"),
        "&#38;&#60;&#62;&#34;"
    );
    assert_eq!(
        render("<ten:echo escape=\"js\"/>", r#""a\"b\\c\nd\r\ne\u2028""#),
        "a\\\"b\\\\c\\\nd\\\r\ne\\\u{2028}"
    );
}

#[test]
fn large_integer_literals_render_like_data() {
    let src = "<ten:echo data=\"9007199254740993\"/>|<ten:echo data=\"this.n\"/>";
    assert_eq!(render(src, r#"{"n": 9007199254740993}"#), "9007199254740992|9007199254740992");

    let program = ten_compiler::compile("<ten:echo data=\"9007199254740991\"/>")
        .unwrap()
        .program;
    assert!(program.contains("__text += \"9007199254740991\";"));
}

#[test]
fn blank_data_reads_the_context() {
    assert_eq!(render("a<ten:echo data=\"\"/>b", r#""x""#), "axb");
    assert_eq!(render("a<ten:echo data=\"  \" format=\"json\"/>b", "[1]"), "a[1]b");
}
