//! Directory rendering under each failure mode, plus best-effort
//! post-processing.

use std::fs;
use std::path::{Path, PathBuf};

use quill_core::{EngineConfig, EngineError, FailureMode, GenerationErrorKind, MemoryTree};
use quill_renderer::{Context, PostProcessChain, PostProcessError, Renderer};
use tempfile::TempDir;

/// Three templates where the second one does not parse.
fn three_files() -> MemoryTree {
    MemoryTree::new()
        .with_file("a.rs.tera", "// {{ service }} a\n")
        .with_file("b.rs.tera", "{{ service \n")
        .with_file("c.rs.tera", "// {{ service }} c\n")
        .with_file("README.md", "not a template")
}

fn data() -> Context {
    let mut ctx = Context::new();
    ctx.insert("service", "billing");
    ctx
}

fn renderer(out: &Path, mode: FailureMode) -> Renderer {
    Renderer::new(
        &EngineConfig::default()
            .with_output_root(out)
            .with_failure_mode(mode),
    )
}

#[test]
fn fail_fast_stops_at_first_error() {
    let out = TempDir::new().expect("tempdir");
    let err = renderer(out.path(), FailureMode::FailFast)
        .render_dir(&three_files(), Path::new(""), &data())
        .expect_err("b.rs.tera must fail");

    match err {
        EngineError::Generation(e) => {
            assert_eq!(e.path, PathBuf::from("b.rs.tera"));
            assert_eq!(e.kind, GenerationErrorKind::Parse);
        }
        other => panic!("expected a single error, got {other}"),
    }
    assert!(out.path().join("a.rs").exists(), "file 1 rendered before abort");
    assert!(!out.path().join("b.rs").exists());
    assert!(!out.path().join("c.rs").exists(), "file 3 must not be processed");
}

#[test]
fn fail_at_end_renders_everything_then_aggregates() {
    let out = TempDir::new().expect("tempdir");
    let err = renderer(out.path(), FailureMode::FailAtEnd)
        .render_dir(&three_files(), Path::new(""), &data())
        .expect_err("aggregated error expected");

    match err {
        EngineError::Multi(multi) => {
            assert_eq!(multi.len(), 1);
            assert_eq!(multi.paths(), vec![Path::new("b.rs.tera")]);
            assert!(multi.to_string().contains("b.rs.tera"));
        }
        other => panic!("expected an aggregated error, got {other}"),
    }
    assert!(out.path().join("a.rs").exists());
    assert!(!out.path().join("b.rs").exists());
    assert!(out.path().join("c.rs").exists());
}

#[test]
fn best_effort_never_returns_an_error() {
    let out = TempDir::new().expect("tempdir");
    let summary = renderer(out.path(), FailureMode::BestEffort)
        .render_dir(&three_files(), Path::new(""), &data())
        .expect("best effort returns Ok");

    assert_eq!(summary.rendered(), 2);
    assert_eq!(summary.skipped, 1, "README.md is not a template");
    assert_eq!(summary.failures.paths(), vec![Path::new("b.rs.tera")]);
    assert_eq!(
        fs::read_to_string(out.path().join("a.rs")).expect("a.rs"),
        "// billing a\n"
    );
    assert!(!out.path().join("b.rs").exists());
    assert!(out.path().join("c.rs").exists());
}

#[test]
fn fail_at_end_preserves_walk_order_across_directories() {
    let out = TempDir::new().expect("tempdir");
    let tree = MemoryTree::new()
        .with_file("z.rs.tera", "{{ nope }}")
        .with_file("api/handlers.rs.tera", "{% if %}")
        .with_file("api/ok.rs.tera", "ok")
        .with_file("m.rs.tera", "{{ also_missing }}");

    let err = renderer(out.path(), FailureMode::FailAtEnd)
        .render_dir(&tree, Path::new(""), &data())
        .expect_err("three failures");
    let EngineError::Multi(multi) = err else {
        panic!("expected aggregated error");
    };
    assert_eq!(
        multi.paths(),
        vec![
            Path::new("api/handlers.rs.tera"),
            Path::new("m.rs.tera"),
            Path::new("z.rs.tera"),
        ]
    );
    let kinds: Vec<_> = multi.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            GenerationErrorKind::Parse,
            GenerationErrorKind::Execute,
            GenerationErrorKind::Execute,
        ]
    );
    assert!(out.path().join("api").join("ok.rs").exists());
}

#[test]
fn subtree_render_keeps_tree_relative_output_paths() {
    let out = TempDir::new().expect("tempdir");
    let tree = MemoryTree::new()
        .with_file("api/routes.rs.tera", "routes")
        .with_file("web/index.ts.tera", "index");
    let summary = renderer(out.path(), FailureMode::FailFast)
        .render_dir(&tree, Path::new("api"), &data())
        .expect("render");
    assert_eq!(summary.written, vec![out.path().join("api").join("routes.rs")]);
    assert!(!out.path().join("web").exists());
}

#[test]
fn second_render_reports_unchanged() {
    let out = TempDir::new().expect("tempdir");
    let tree = MemoryTree::new().with_file("a.rs.tera", "{{ service }}");
    let r = renderer(out.path(), FailureMode::FailFast);
    let first = r.render_dir(&tree, Path::new(""), &data()).expect("first");
    assert_eq!(first.written.len(), 1);
    let second = r.render_dir(&tree, Path::new(""), &data()).expect("second");
    assert!(second.written.is_empty());
    assert_eq!(second.unchanged.len(), 1);
}

#[test]
fn failing_post_processor_writes_unprocessed_bytes() {
    let out = TempDir::new().expect("tempdir");
    let tree = MemoryTree::new().with_file("a.rs.tera", "fn {{ service }}() {}   \n");

    let mut chain = PostProcessChain::new();
    chain.push_fn("uppercase", |_, c| Ok(c.to_ascii_uppercase()));
    chain.push_fn("explode", |p, _| Err(PostProcessError::new("explode", p, "boom")));
    let r = renderer(out.path(), FailureMode::FailFast).with_post_chain(chain);

    r.render_dir(&tree, Path::new(""), &data()).expect("render succeeds");
    assert_eq!(
        fs::read_to_string(out.path().join("a.rs")).expect("a.rs"),
        "fn billing() {}   \n",
        "content must equal the pre-post-processing buffer"
    );
}

#[test]
fn configured_post_processing_is_applied() {
    let out = TempDir::new().expect("tempdir");
    let tree = MemoryTree::new().with_file("a.rs.tera", "fn {{ service }}() {}   \r\n");
    let mut config = EngineConfig::default().with_output_root(out.path());
    config.post_process.normalize_line_endings = true;
    config.post_process.trim_trailing_whitespace = true;
    config.post_process.header = Some("Code generated by quill. DO NOT EDIT.".to_string());

    Renderer::new(&config)
        .render_dir(&tree, Path::new(""), &data())
        .expect("render");
    assert_eq!(
        fs::read_to_string(out.path().join("a.rs")).expect("a.rs"),
        "// Code generated by quill. DO NOT EDIT.\n\nfn billing() {}\n"
    );
}
