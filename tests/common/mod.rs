//! Shared fixtures for the integration tests

#![allow(dead_code)]

use heed::types::Bytes;
use heed::{Database, EnvOpenOptions};
use quill_migrate::{MigrationEngine, Settings};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

pub const FRESH_ENTRY: &str = r#"{"response": "Once upon a time", "model": "gpt-4o", "prompt": "Start a story", "created_at": "2024-01-01T10:00:00Z", "tokens_used": 120}"#;
pub const EXPIRED_ENTRY: &str = r#"{"response": "Old news", "model": "gpt-4o", "expires_at": "2001-01-01T00:00:00Z"}"#;
pub const PICKLED_ENTRY: &[u8] = b"\x80\x04\x95\x1c\x00\x00\x00\x00\x00\x00\x00}\x94\x8c\x08response\x94\x8c\x02hi\x94s.";

/// A temp root holding a legacy workspace and a separate Quill home
pub struct Fixture {
    pub root: TempDir,
    pub source: PathBuf,
    pub home: PathBuf,
}

impl Fixture {
    pub fn engine(&self) -> MigrationEngine {
        MigrationEngine::new(Settings::with_home(&self.home))
    }

    pub fn target(&self, workspace: &str) -> PathBuf {
        self.home.join("workspaces").join(workspace)
    }
}

fn write(path: &Path, contents: impl AsRef<[u8]>) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

/// Legacy workspace with config, YAML and JSON pipelines, style primers, templates,
/// content and a flat-file cache holding one fresh, one expired and one
/// pickled entry.
pub fn legacy_workspace() -> Fixture {
    let root = TempDir::new().unwrap();
    let source = root.path().join("novel");
    let home = root.path().join("quill-home");

    write(
        &source.join(".quill/config.yaml"),
        "workspace_name: novel\ncache_enabled: \"yes\"\ncache_ttl: \"48\"\nllm:\n  default_model: gpt-4o\n  temperature: 0.7\nproviders: openai, anthropic\n",
    );
    write(
        &source.join("pipelines/outline.yaml"),
        "name: Chapter Outline\ndescription: Outline a chapter\ninputs:\n  topic:\n    type: text\n    required: yes\nsteps:\n  - name: Outline\n    prompt: \"Outline {topic}\"\n  - name: Expand\n    prompt: Expand the outline\n    depends_on: step_1\n",
    );
    write(&source.join("pipelines/broken.yaml"), "name: [unclosed\n");
    write(
        &source.join("pipelines/summary.json"),
        r#"{"name": "Chapter Summary", "steps": [{"name": "Summarize", "prompt": "Summarize {chapter}"}]}"#,
    );
    write(
        &source.join("styles/noir.yaml"),
        "name: Noir\nguidelines:\n  tone: terse\n  rules:\n    - short sentences\n    - rain\n",
    );
    write(
        &source.join("templates/letter.md"),
        "---\nname: Letter\ntags: [epistolary]\n---\nDear {recipient},\n",
    );
    write(&source.join("articles/chapter-1.md"), "# Chapter 1\n\nIt was raining.\n");
    write(&source.join("drafts/ideas/twist.txt"), "The butler did not do it.\n");
    write(&source.join("cache/fresh.json"), FRESH_ENTRY);
    write(&source.join("cache/expired.json"), EXPIRED_ENTRY);
    write(&source.join("cache/pickled.cache"), PICKLED_ENTRY);

    Fixture { root, source, home }
}

/// Write an LMDB environment into `dir` with the given records in the
/// unnamed database, then close it so it can be reopened read-only.
pub fn write_lmdb(dir: &Path, records: &[(&[u8], &[u8])]) {
    fs::create_dir_all(dir).unwrap();
    let env = unsafe {
        EnvOpenOptions::new()
            .map_size(4 * 1024 * 1024)
            .open(dir)
            .unwrap()
    };
    let mut wtxn = env.write_txn().unwrap();
    let db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, None).unwrap();
    for (key, value) in records {
        db.put(&mut wtxn, key, value).unwrap();
    }
    wtxn.commit().unwrap();
    env.prepare_for_closing().wait();
}

/// Every file under `dir` keyed by relative path
pub fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let relative = entry.path().strip_prefix(dir).unwrap().to_path_buf();
            (relative, fs::read(entry.path()).unwrap())
        })
        .collect()
}
