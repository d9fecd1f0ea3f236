//! Semantic checking through an external checker binary.
//!
//! A small shell script stands in for tsgo/tsc: it records the tsconfig it was
//! handed and prints fixed `--pretty false` output.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use tsmith_core::{
    CompileOutcome, CompileRequest, OutputFormat, SYNTAX_ONLY, Severity, Toolchain,
    TypeCheckRequest, TsgoEngine,
};

const ADD_SOURCE: &str = "function add(a:number,b:number):string { return a+b; }\nadd(\"5\",10);\n";

const ADD_OUTPUT: &str = "\
add.ts(1,42): error TS2322: Type 'number' is not assignable to type 'string'.
add.ts(2,5): error TS2345: Argument of type 'string' is not assignable to parameter of type 'number'.

Found 2 errors in the same file, starting at: add.ts:1
";

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    checker: PathBuf,
}

impl Fixture {
    /// A workspace with `add.ts` and a checker that prints `output` and exits with `status`.
    fn new(output: &str, status: i32) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("add.ts"), ADD_SOURCE).unwrap();

        std::fs::create_dir_all(root.join("bin")).unwrap();
        std::fs::write(root.join("bin/output.txt"), output).unwrap();
        let checker = root.join("bin/fake-tsc");
        let script = format!(
            "#!/bin/sh\n\
             [ \"$1\" = \"--project\" ] && cp \"$2\" \"{bin}/seen.json\"\n\
             cat \"{bin}/output.txt\"\n\
             exit {status}\n",
            bin = root.join("bin").display(),
            status = status,
        );
        std::fs::write(&checker, script).unwrap();
        std::fs::set_permissions(&checker, std::fs::Permissions::from_mode(0o755)).unwrap();

        Self {
            _dir: dir,
            root,
            checker,
        }
    }

    fn toolchain(&self) -> Toolchain {
        Toolchain::with_engine(
            Arc::new(TsgoEngine::with_binary(&self.checker)),
            Duration::from_millis(50),
        )
    }

    /// The synthetic tsconfig the checker received.
    fn seen_config(&self) -> serde_json::Value {
        let text = std::fs::read_to_string(self.root.join("bin/seen.json")).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }
}

// ============================================================================
// Type checking
// ============================================================================

#[tokio::test]
async fn test_check_types_reports_semantic_errors() {
    let fixture = Fixture::new(ADD_OUTPUT, 2);
    let toolchain = fixture.toolchain();

    let result = toolchain
        .check_types(&TypeCheckRequest::new(fixture.path("add.ts")))
        .await
        .unwrap();

    assert!(!result.success);
    let found: Vec<(&str, u32, u32)> = result
        .diagnostics
        .iter()
        .map(|d| (d.code.as_str(), d.line, d.column))
        .collect();
    assert_eq!(found, vec![("TS2322", 1, 42), ("TS2345", 2, 5)]);
    assert!(
        result
            .diagnostics
            .iter()
            .all(|d| Path::new(&d.file) == fixture.path("add.ts"))
    );
    assert_eq!(result.summary.error_count, 2);
}

#[tokio::test]
async fn test_checker_receives_resolved_options() {
    let fixture = Fixture::new("", 0);
    std::fs::write(
        fixture.path("tsconfig.json"),
        r#"{ "compilerOptions": { "outDir": "dist", "noUnusedLocals": true } }"#,
    )
    .unwrap();
    let toolchain = fixture.toolchain();

    let result = toolchain
        .check_types(&TypeCheckRequest::new(fixture.path("add.ts")).with_strict(true))
        .await
        .unwrap();
    assert!(result.success);
    assert!(result.diagnostics.is_empty());

    let config = fixture.seen_config();
    let options = &config["compilerOptions"];
    assert_eq!(options["strict"], true);
    assert_eq!(options["noUnusedLocals"], true);
    assert_eq!(options["noEmit"], true);
    assert!(options.get("outDir").is_none());
    assert_eq!(
        config["files"],
        serde_json::json!([fixture.path("add.ts").display().to_string()])
    );
}

#[tokio::test]
async fn test_get_diagnostics_renders_checker_output() {
    let fixture = Fixture::new(ADD_OUTPUT, 2);
    let toolchain = fixture.toolchain();

    let text = toolchain
        .get_diagnostics(&TypeCheckRequest::new(fixture.path("add.ts")))
        .await
        .unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("(TS2322)"));
    assert!(lines[1].contains(":2:5 - error: Argument of type 'string'"));

    let json = toolchain
        .get_diagnostics(
            &TypeCheckRequest::new(fixture.path("add.ts")).with_format(OutputFormat::Json),
        )
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed[1]["code"], "TS2345");
}

#[tokio::test]
async fn test_syntax_errors_are_reported_without_running_the_checker() {
    let fixture = Fixture::new(ADD_OUTPUT, 2);
    std::fs::write(fixture.path("add.ts"), "const x: = 1;\n").unwrap();
    let toolchain = fixture.toolchain();

    let result = toolchain
        .check_types(&TypeCheckRequest::new(fixture.path("add.ts")))
        .await
        .unwrap();

    assert!(!result.success);
    assert!(!result.diagnostics.is_empty());
    assert!(result.diagnostics.iter().all(|d| d.code == "TS1005"));
    assert!(!fixture.path("bin/seen.json").exists());
}

#[tokio::test]
async fn test_failing_checker_degrades_to_syntax_only() {
    let fixture = Fixture::new("", 3);
    std::fs::write(fixture.path("bin/output.txt"), "").unwrap();
    let toolchain = fixture.toolchain();

    let result = toolchain
        .check_types(&TypeCheckRequest::new(fixture.path("add.ts")))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.diagnostics.len(), 1);
    let notice = &result.diagnostics[0];
    assert_eq!(notice.code, SYNTAX_ONLY);
    assert_eq!(notice.severity, Severity::Warning);
    assert!(notice.message.contains("fake-tsc"));
}

// ============================================================================
// Project builds
// ============================================================================

#[tokio::test]
async fn test_project_build_reports_type_errors_and_still_emits() {
    let fixture = Fixture::new(ADD_OUTPUT, 2);
    std::fs::write(
        fixture.path("tsconfig.json"),
        r#"{ "compilerOptions": { "outDir": "dist" }, "include": ["add.ts"] }"#,
    )
    .unwrap();
    let toolchain = fixture.toolchain();

    let outcome = toolchain
        .compile(&CompileRequest::project(&fixture.root))
        .await
        .unwrap();
    let CompileOutcome::Completed(result) = outcome else {
        panic!("expected a completed compilation");
    };

    assert!(!result.success);
    let codes: Vec<&str> = result.diagnostics.iter().map(|d| d.code.as_str()).collect();
    assert_eq!(codes, vec!["TS2322", "TS2345"]);
    assert!(fixture.path("dist/add.js").is_file());
}

#[tokio::test]
async fn test_single_file_compile_does_not_run_the_checker() {
    let fixture = Fixture::new(ADD_OUTPUT, 2);
    let toolchain = fixture.toolchain();

    let outcome = toolchain
        .compile(&CompileRequest::file(fixture.path("add.ts")))
        .await
        .unwrap();
    let CompileOutcome::Completed(result) = outcome else {
        panic!("expected a completed compilation");
    };

    assert!(result.success);
    assert!(!fixture.path("bin/seen.json").exists());
}
