#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

use dockets::MemoryService;
use dockets::types::{DOCKETS, FAVORITES};
use serde_json::{Value, json};
use tempfile::TempDir;

/// One docket row as the service returns it.
pub fn docket(i: usize, title: &str, petitioner: &str) -> Value {
    json!({
        "uuid": format!("d{i:04}"),
        "docket_govid": format!("24-E-{i:04}"),
        "docket_title": title,
        "petitioner": petitioner,
        "industry": if i % 3 == 0 { "Gas" } else { "Electric" },
        "current_status": if i % 2 == 0 { "open" } else { "closed" },
        "opened_date": format!("2024-{:02}-{:02}", i % 12 + 1, i % 28 + 1),
    })
}

/// `n` dockets from assorted petitioners.
pub fn dockets(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| docket(i, &format!("Rate case {i}"), "Central Hudson"))
        .collect()
}

pub fn service_with(rows: Vec<Value>) -> MemoryService {
    MemoryService::new()
        .with_table(DOCKETS, rows)
        .with_unique_key(FAVORITES, &["user_id", "docket_govid"])
}

/// Runs the `dockets` binary against a fixture in an isolated temp directory.
pub struct DocketsCli {
    pub temp_dir: TempDir,
    fixture: PathBuf,
}

impl DocketsCli {
    pub fn new(fixture: Value) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let fixture_path = temp_dir.path().join("fixture.json");
        fs::write(&fixture_path, fixture.to_string()).expect("Failed to write fixture");

        DocketsCli {
            temp_dir,
            fixture: fixture_path,
        }
    }

    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_dockets"))
            .args(args)
            .current_dir(self.temp_dir.path())
            .env("DOCKETS_CONFIG_DIR", self.temp_dir.path().join("config"))
            .env("DOCKETS_DATA_DIR", self.temp_dir.path().join("data"))
            .env("DOCKETS_FIXTURE", &self.fixture)
            .env_remove("DOCKETS_API_URL")
            .env_remove("DOCKETS_API_KEY")
            .env_remove("DOCKETS_USER")
            .env_remove("RUST_LOG")
            .output()
            .expect("Failed to execute dockets command")
    }

    pub fn run_success(&self, args: &[&str]) -> String {
        let output = self.run(args);
        if !output.status.success() {
            panic!(
                "Command {:?} failed with status {:?}\nstdout: {}\nstderr: {}",
                args,
                output.status,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
        }
        String::from_utf8_lossy(&output.stdout).to_string()
    }

    pub fn run_failure(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            !output.status.success(),
            "Expected command {:?} to fail, but it succeeded",
            args
        );
        String::from_utf8_lossy(&output.stderr).to_string()
    }

    /// Run with `--json` appended and parse stdout.
    pub fn run_json(&self, args: &[&str]) -> Value {
        let mut args = args.to_vec();
        args.push("--json");
        let stdout = self.run_success(&args);
        serde_json::from_str(&stdout)
            .unwrap_or_else(|e| panic!("invalid JSON from {args:?}: {e}\n{stdout}"))
    }
}
