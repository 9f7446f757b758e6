use std::fs;
use std::path::PathBuf;

use ten_cli::{EmitMode, Options};

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(path)
}

fn out_dir(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../target/ten-cli-tests")
        .join(format!("{}-{name}", std::process::id()))
}

#[test]
fn cli_build_emits_bundle() {
    let out = out_dir("bundle");
    let report = ten_cli::build_cmd(
        &fixture("site/index.ten"),
        &Options::default(),
        Some(out.as_path()),
        EmitMode::Bundle,
    )
    .expect("build bundle");

    assert!(report.diagnostics.is_empty(), "{:?}", report.rendered);
    assert_eq!(report.written, vec![out.join("index.js")]);
    let script = fs::read_to_string(out.join("index.js")).expect("read bundle");
    assert!(script.contains("__units[\"index.ten\"] = (function (__units, __stream, __parent) {"));
    assert!(script.contains("__units[\"parts/header.ten\"]"));
}

#[test]
fn cli_build_emits_one_file_per_unit() {
    let out = out_dir("units");
    let report = ten_cli::build_cmd(
        &fixture("site/index.ten"),
        &Options::default(),
        Some(out.as_path()),
        EmitMode::Unit,
    )
    .expect("build units");

    assert_eq!(
        report.written,
        vec![out.join("index.js"), out.join("parts/header.js")]
    );
    let header = fs::read_to_string(out.join("parts/header.js")).expect("read unit");
    assert!(header.starts_with("(function (__units, __stream, __parent) {"));
}

#[test]
fn cli_check_reports_positions_with_excerpts() {
    let options = Options {
        config: Some(fixture("tabs.json")),
        ..Options::default()
    };
    let report = ten_cli::check_cmd(&fixture("broken/index.ten"), &options, true).expect("check");

    assert!(report.has_errors());
    let messages: Vec<_> = report
        .diagnostics
        .iter()
        .map(|d| (d.line, d.column, d.message.as_str()))
        .collect();
    assert_eq!(
        messages,
        vec![
            (0, 0, "Invalid indent."),
            (3, 2, "Unknown tag \"bogus\"."),
            (2, 1, "Tag is not closed."),
        ]
    );
    assert!(report.rendered[1].ends_with("\n            <ten:bogus/>\n            ^"));
    let outline = report.outline.expect("outline");
    assert!(outline.starts_with("#root\n"));
    assert!(outline.contains("  if test=\"this.ok\"\n"));
}

#[test]
fn cli_rejects_input_outside_root() {
    let options = Options {
        root: Some(fixture("site/parts")),
        ..Options::default()
    };
    let err = ten_cli::check_cmd(&fixture("site/index.ten"), &options, false).unwrap_err();
    assert!(err.to_string().contains("is not inside the template root"));
}
