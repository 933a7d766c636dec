use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn assist_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("assist");
    path
}

const CATALOG: &str = r#"{
  "products": [
    {"productId": "TS001", "name": "Erigo T-Shirt Skye Black", "category": "T-Shirt", "price": 89000, "stock": 12, "size": "L", "description": "Kaos katun hitam", "unitsSold": 120},
    {"productId": "CL001", "name": "Celana Chino Krem", "category": "Celana", "price": 199000, "stock": 4, "size": "32", "description": "Celana chino bagus untuk kerja", "rating": 4.7, "unitsSold": 40},
    {"productId": "KM001", "name": "Kemeja Flanel Kotak", "category": "Kemeja", "price": 179000, "stock": 6, "size": "M", "description": "Flanel tebal", "rating": 4.7, "unitsSold": 40},
    {"productId": "JK001", "name": "Jaket Harrington", "category": "Jaket", "price": 259000, "stock": 0, "size": "L", "description": "Jaket klasik", "unitsSold": 65}
  ],
  "reviews": [
    {"productName": "Erigo T-Shirt Skye Black", "rating": 4},
    {"productName": "Erigo T-Shirt Skye Black", "rating": 5}
  ]
}"#;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(root.join("catalog.json"), CATALOG).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/catalog.sqlite"

[model]
provider = "disabled"

[server]
bind = "127.0.0.1:7340"
"#,
        root.display()
    );

    let config_path = config_dir.join("assist.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_assist(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = assist_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run assist binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn seeded_env() -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env();
    let catalog = tmp.path().join("catalog.json");
    let (stdout, stderr, success) =
        run_assist(&config_path, &["import", catalog.to_str().unwrap()]);
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    (tmp, config_path)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_assist(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/catalog.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_assist(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_assist(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_import_reports_counts() {
    let (tmp, config_path) = setup_test_env();
    let catalog = tmp.path().join("catalog.json");

    let (stdout, stderr, success) =
        run_assist(&config_path, &["import", catalog.to_str().unwrap()]);
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Imported 4 products and 2 reviews"));
}

#[test]
fn test_import_missing_file_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_assist(&config_path, &["import", "/nonexistent/catalog.json"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read catalog file"));
}

#[test]
fn test_recommend_falls_back_without_model() {
    let (_tmp, config_path) = seeded_env();

    let (stdout, stderr, success) = run_assist(&config_path, &["recommend", "celana jeans bagus"]);
    assert!(success, "recommend failed: stdout={}, stderr={}", stdout, stderr);

    let body: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(body["fallback"], true);
    let ids: Vec<&str> = body["products"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["productId"].as_str().unwrap())
        .collect();
    assert_eq!(ids.first(), Some(&"CL001"));
    // Out-of-stock products are never recommended.
    assert!(!ids.contains(&"JK001"));
}

#[test]
fn test_recommend_short_query_errors() {
    let (_tmp, config_path) = seeded_env();

    let (_, stderr, success) = run_assist(&config_path, &["recommend", "ab"]);
    assert!(!success);
    assert!(stderr.contains("at least 3 characters"));
}

#[test]
fn test_suggest_corrects_typo() {
    let (_tmp, config_path) = seeded_env();

    let (stdout, stderr, success) = run_assist(&config_path, &["suggest", "koas"]);
    assert!(success, "suggest failed: stdout={}, stderr={}", stdout, stderr);

    let body: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(body["correctedQuery"], "kaos");
    assert_eq!(body["aiGenerated"], false);
    assert!(!body["relatedTerms"].as_array().unwrap().is_empty());
}

#[test]
fn test_suggest_no_related() {
    let (_tmp, config_path) = seeded_env();

    let (stdout, _, success) = run_assist(&config_path, &["suggest", "celana", "--no-related"]);
    assert!(success);

    let body: Value = serde_json::from_str(&stdout).unwrap();
    assert!(body["relatedTerms"].as_array().unwrap().is_empty());
}

#[test]
fn test_chat_answers_without_model() {
    let (_tmp, config_path) = seeded_env();

    let (stdout, stderr, success) = run_assist(&config_path, &["chat", "cari kaos hitam dong"]);
    assert!(success, "chat failed: stdout={}, stderr={}", stdout, stderr);

    let body: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(body["fallback"], true);
    assert!(!body["response"].as_str().unwrap().is_empty());
}

#[test]
fn test_unknown_provider_rejected() {
    let (tmp, _) = setup_test_env();
    let config_path = tmp.path().join("config/bad.toml");
    fs::write(
        &config_path,
        "[db]\npath = \"x.sqlite\"\n\n[model]\nprovider = \"openai\"\n\n[server]\nbind = \"127.0.0.1:7340\"\n",
    )
    .unwrap();

    let (_, stderr, success) = run_assist(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Unknown model provider"));
}
