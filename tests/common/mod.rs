#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tempfile::TempDir;

pub const CREATED_ID: &str = "create-id-123";
pub const EXISTING_ID: &str = "info-id-456";

pub const DESCRIPTOR: &str = r#"# email tracking worker
name = "placeholder"
main = "src/index.js"
compatibility_date = "2024-09-01"

[[d1_databases]]
binding = "DB"
database_name = "placeholder"
database_id = "placeholder"
"#;

static STUB_LOCK: Mutex<()> = Mutex::new(());

/// Serializes tests that write executables: a concurrent fork in another
/// test thread can keep the script open for writing and fail its exec.
pub fn serial() -> MutexGuard<'static, ()> {
    STUB_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

/// Scratch layout: `bin/` for the stub tool, `work/` for the descriptor.
pub struct Sandbox {
    pub root: TempDir,
}

impl Sandbox {
    pub fn new() -> Sandbox {
        let root = tempfile::tempdir().expect("Failed to create sandbox");
        fs::create_dir(root.path().join("bin")).expect("Failed to create bin dir");
        fs::create_dir(root.path().join("work")).expect("Failed to create work dir");
        Sandbox { root }
    }

    pub fn bin(&self) -> PathBuf {
        self.root.path().join("bin")
    }

    pub fn work(&self) -> PathBuf {
        self.root.path().join("work")
    }

    pub fn calls_log(&self) -> PathBuf {
        self.root.path().join("calls.log")
    }

    pub fn secrets_log(&self) -> PathBuf {
        self.root.path().join("secrets.log")
    }

    pub fn with_descriptor(self) -> Sandbox {
        fs::write(self.work().join("wrangler.toml"), DESCRIPTOR).expect("Failed to write descriptor");
        self
    }

    pub fn with_schema(self) -> Sandbox {
        fs::write(
            self.work().join("schema.sql"),
            "CREATE TABLE IF NOT EXISTS opens (id TEXT PRIMARY KEY);\n",
        )
        .expect("Failed to write schema");
        self
    }

    /// Installs a `wrangler` stand-in that logs its arguments and the secret
    /// values it receives on stdin.
    pub fn with_stub_tool(self, create_succeeds: bool) -> Sandbox {
        let create = if create_succeeds {
            format!("echo 'database_id = \"{CREATED_ID}\"'")
        } else {
            "echo 'A database with that name already exists' >&2; exit 1".to_string()
        };

        let script = format!(
            r#"#!/bin/sh
printf '%s\n' "$*" >> '{calls}'
case "$1 $2" in
  "d1 create") {create} ;;
  "d1 info") echo 'Database ID: {EXISTING_ID}' ;;
  "d1 execute") ;;
  "secret put") cat >> '{secrets}'; echo >> '{secrets}' ;;
  deploy*) echo 'Deployed email tracking worker' ;;
  *) echo "unexpected: $*" >&2; exit 2 ;;
esac
"#,
            calls = self.calls_log().display(),
            secrets = self.secrets_log().display(),
        );

        write_executable(&self.bin().join("wrangler"), &script);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        read_lines(&self.calls_log())
    }

    pub fn secrets(&self) -> Vec<String> {
        read_lines(&self.secrets_log())
    }

    pub fn descriptor(&self) -> String {
        fs::read_to_string(self.work().join("wrangler.toml")).expect("Failed to read descriptor")
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn write_executable(path: &Path, content: &str) {
    fs::write(path, content).expect("Failed to write stub tool");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .expect("Failed to make stub tool executable");
    }
}
