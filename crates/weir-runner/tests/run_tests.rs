use std::path::PathBuf;

use weir_chain::load_chain_manifest;
use weir_contracts::{
    ARG_UNUSED, SYS_OPEN, SYS_READ, WEIR_CHAIN_MANIFEST_SCHEMA_VERSION,
    WEIR_SEED_MANIFEST_SCHEMA_VERSION,
};
use weir_runner::{build_chain, cell_program, run_manifest, RunnerOverrides};

fn create_temp_dir(prefix: &str) -> PathBuf {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let base = std::env::temp_dir();
    let pid = std::process::id();
    for _ in 0..10_000 {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = base.join(format!("{prefix}_{pid}_{n}"));
        if std::fs::create_dir(&path).is_ok() {
            return path;
        }
    }
    panic!("failed to create temp dir under {}", base.display());
}

fn rm_rf(path: &std::path::Path) {
    let _ = std::fs::remove_dir_all(path);
}

fn write_chain_manifest(dir: &std::path::Path, body: &str) -> PathBuf {
    let path = dir.join("chain.json");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn fs_check_scenario_round_trips_hello() {
    let dir = create_temp_dir("weir_run_a");
    let manifest_path = write_chain_manifest(
        &dir,
        &format!(
            r#"{{
              "schema_version": "{WEIR_CHAIN_MANIFEST_SCHEMA_VERSION}",
              "stages": [{{"interceptor": "fs", "audit_log": "{}"}}],
              "cell": "fs-check"
            }}"#,
            dir.join("audit.log").display()
        ),
    );

    let manifest = load_chain_manifest(&manifest_path).unwrap();
    let report = run_manifest(&manifest, &RunnerOverrides::default()).unwrap();

    assert_eq!(report.cell_status, 0);
    assert_eq!(report.stages.len(), 1);
    assert_eq!(report.stages[0].name, "fs");
    assert_eq!(report.stages[0].handlers, 6);
    rm_rf(&dir);
}

#[test]
fn screen_check_scenario_blocks_the_magic_path() {
    let dir = create_temp_dir("weir_run_c");
    let manifest_path = write_chain_manifest(
        &dir,
        &format!(
            r#"{{
              "schema_version": "{WEIR_CHAIN_MANIFEST_SCHEMA_VERSION}",
              "stages": [{{"interceptor": "screen"}}],
              "cell": "screen-check"
            }}"#
        ),
    );

    let manifest = load_chain_manifest(&manifest_path).unwrap();
    let report = run_manifest(&manifest, &RunnerOverrides::default()).unwrap();
    assert_eq!(report.cell_status, 0);
    rm_rf(&dir);
}

#[test]
fn a_three_stage_chain_composes_trace_screen_and_fs() {
    let dir = create_temp_dir("weir_run_stack");
    // Outermost-first: the filesystem sits nearest the host, the tracer
    // nearest the cell. Every cell call passes trace, then screen, then fs.
    let manifest_path = write_chain_manifest(
        &dir,
        &format!(
            r#"{{
              "schema_version": "{WEIR_CHAIN_MANIFEST_SCHEMA_VERSION}",
              "stages": [
                {{"interceptor": "fs", "audit_log": "{}"}},
                {{"interceptor": "screen"}},
                {{"interceptor": "trace", "syscalls": ["OPEN", "WRITE", "READ", "CLOSE", "LSEEK", "FCNTL"]}}
              ],
              "cell": "fs-check"
            }}"#,
            dir.join("audit.log").display()
        ),
    );

    let manifest = load_chain_manifest(&manifest_path).unwrap();
    let report = run_manifest(&manifest, &RunnerOverrides::default()).unwrap();

    assert_eq!(report.cell_status, 0);
    let names: Vec<&str> = report.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["fs", "screen", "trace"]);
    rm_rf(&dir);
}

#[test]
fn seeded_content_is_visible_to_the_first_open() {
    let dir = create_temp_dir("weir_run_seed");

    // sha256 of "Hello"
    let digest = "sha256:185f8db32271fe25f561a6fc938b2e264306ec304eda518007d1764826381969";
    let seeds_path = dir.join("seeds.json");
    std::fs::write(
        &seeds_path,
        format!(
            r#"{{
              "schema_version": "{WEIR_SEED_MANIFEST_SCHEMA_VERSION}",
              "files": [{{"path": "etc/motd", "content_b64": "SGVsbG8=", "sha256": "{digest}"}}]
            }}"#
        ),
    )
    .unwrap();

    let manifest_path = write_chain_manifest(
        &dir,
        &format!(
            r#"{{
              "schema_version": "{WEIR_CHAIN_MANIFEST_SCHEMA_VERSION}",
              "stages": [{{"interceptor": "fs", "seeds": "{}", "audit_log": "{}"}}],
              "cell": "fs-check"
            }}"#,
            seeds_path.display(),
            dir.join("audit.log").display()
        ),
    );

    let manifest = load_chain_manifest(&manifest_path).unwrap();
    let chain = build_chain(&manifest, &RunnerOverrides::default()).unwrap();

    let report = chain
        .run(Box::new(|cell| {
            cell.poke_cstr(0, "etc/motd").unwrap();
            // No create flag: only the preload can make this succeed.
            let fd = cell.syscall(
                SYS_OPEN,
                [0, libc::O_RDONLY as u64, 0, ARG_UNUSED, ARG_UNUSED, ARG_UNUSED],
            );
            if fd < 0 {
                return 1;
            }
            let n = cell.syscall(
                SYS_READ,
                [fd as u64, 256, 16, ARG_UNUSED, ARG_UNUSED, ARG_UNUSED],
            );
            if n != 5 {
                return 2;
            }
            match cell.peek(256, 5) {
                Ok(bytes) if bytes == b"Hello" => 0,
                _ => 3,
            }
        }))
        .unwrap();

    assert_eq!(report.cell_status, 0);
    rm_rf(&dir);
}

#[test]
fn failed_opens_land_in_the_audit_artifact() {
    let dir = create_temp_dir("weir_run_audit");
    let audit = dir.join("audit.log");
    let manifest_path = write_chain_manifest(
        &dir,
        &format!(
            r#"{{
              "schema_version": "{WEIR_CHAIN_MANIFEST_SCHEMA_VERSION}",
              "stages": [{{"interceptor": "fs", "audit_log": "{}"}}],
              "cell": "fs-check"
            }}"#,
            audit.display()
        ),
    );

    let manifest = load_chain_manifest(&manifest_path).unwrap();
    let chain = build_chain(&manifest, &RunnerOverrides::default()).unwrap();
    let report = chain
        .run(Box::new(|cell| {
            cell.poke_cstr(0, "not-seeded").unwrap();
            cell.syscall(
                SYS_OPEN,
                [0, libc::O_RDONLY as u64, 0, ARG_UNUSED, ARG_UNUSED, ARG_UNUSED],
            )
        }))
        .unwrap();

    assert_eq!(report.cell_status, -libc::ENOENT);
    let content = std::fs::read_to_string(&audit).unwrap();
    assert_eq!(content, format!("PATH=not-seeded | RET={}\n", libc::ENOENT));
    rm_rf(&dir);
}

#[test]
fn dispatch_of_an_absent_callback_returns_the_sentinel_without_side_effects() {
    use weir_chain::{DenyAllHost, LocalRuntime};
    use weir_core::{dispatch, Invocation, Runtime};

    let rt = LocalRuntime::new(Box::new(DenyAllHost));
    let cell = rt.create_cell_domain(4096);
    rt.memory().write_bytes(cell, 0, b"untouched").unwrap();

    let inv = Invocation::from_caller(SYS_OPEN, cell, [0; 6]);
    assert_eq!(dispatch(None, &rt, &inv), weir_contracts::DISPATCH_UNRESOLVED);
    assert_eq!(rt.memory().read_bytes(cell, 0, 9).unwrap(), b"untouched");
}

#[test]
fn unknown_interceptors_and_scenarios_are_rejected() {
    let raw = format!(
        r#"{{
          "schema_version": "{WEIR_CHAIN_MANIFEST_SCHEMA_VERSION}",
          "stages": [{{"interceptor": "nonesuch"}}],
          "cell": "fs-check"
        }}"#
    );
    let manifest: weir_chain::ChainManifest = serde_json::from_str(&raw).unwrap();
    let err = build_chain(&manifest, &RunnerOverrides::default()).unwrap_err();
    assert!(err.to_string().contains("unknown interceptor"));

    assert!(cell_program("nonesuch").is_err());
}
