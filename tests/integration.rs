use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use summary_harness::db;
use summary_harness::migrate;
use summary_harness::sqlite_store::SqliteLeaseStore;
use summary_harness_core::store::LeaseStore;
use tempfile::TempDir;

fn summ_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("summ");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/summ.sqlite"

[providers]
summarizer = [{{ name = "local", devices = [1] }}]

[summarizers.local]
endpoint = "http://127.0.0.1:9/v1"
model = "stub"

[summary]
retries = 0
timeout_secs = 1
"#,
        root.display()
    );

    let config_path = config_dir.join("summ.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_summ(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = summ_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .stdin(Stdio::null())
        .output()
        .unwrap_or_else(|e| panic!("Failed to run summ binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn seed_lease(root: &Path, key: &str, holders: &[&str]) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let pool = db::connect_path(&root.join("data/summ.sqlite"))
            .await
            .unwrap();
        migrate::migrate(&pool).await.unwrap();
        let holders: BTreeSet<String> = holders.iter().map(|h| h.to_string()).collect();
        SqliteLeaseStore::new(pool.clone())
            .set_holders(key, &holders)
            .await
            .unwrap();
        pool.close().await;
    });
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_summ(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/summ.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_summ(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_summ(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_summ(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_leases_list_empty() {
    let (_tmp, config_path) = setup_test_env();
    run_summ(&config_path, &["init"]);

    let (stdout, stderr, success) = run_summ(&config_path, &["leases", "list"]);
    assert!(success, "leases list failed: {}", stderr);
    assert!(stdout.contains("No active leases."));
}

#[test]
fn test_leases_release_crashed_requester() {
    let (tmp, config_path) = setup_test_env();
    seed_lease(tmp.path(), "summarizer.local.cuda:0", &["crashed", "alive"]);
    seed_lease(tmp.path(), "encoder.minilm.cuda:0", &["crashed"]);

    let (stdout, _, success) = run_summ(&config_path, &["leases", "list"]);
    assert!(success);
    assert!(stdout.contains("summarizer.local.cuda:0  alive,crashed"));

    let (stdout, stderr, success) = run_summ(&config_path, &["leases", "release", "crashed"]);
    assert!(success, "release failed: {}", stderr);
    assert!(stdout.contains("Released 2 lease(s) held by crashed."));

    let (stdout, _, _) = run_summ(&config_path, &["leases", "list"]);
    assert!(stdout.contains("summarizer.local.cuda:0  alive"));
    assert!(!stdout.contains("encoder.minilm"));
    assert!(!stdout.contains("crashed"));
}

#[test]
fn test_empty_stdin_returns_placeholder() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_summ(&config_path, &["text", "-", "--prompt", "Summarize."]);
    assert!(success, "text failed: {}", stderr);
    assert!(stdout.contains("No relevant information was found"));
    assert!(stderr.contains("calls: 0"));
}

#[test]
fn test_text_missing_file_fails() {
    let (tmp, config_path) = setup_test_env();
    let missing = tmp.path().join("missing.md");

    let (_, stderr, success) = run_summ(
        &config_path,
        &["text", missing.to_str().unwrap(), "--prompt", "Summarize."],
    );
    assert!(!success);
    assert!(stderr.contains("Failed to read"));
}

#[test]
fn test_documents_requires_vector_config() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_summ(&config_path, &["documents", "--prompt", "What changed?"]);
    assert!(!success);
    assert!(stderr.contains("[vector]"));
}
