// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const MIGRATIONS_DIR: &str = "migrations";

fn migration_files() -> Vec<PathBuf> {
    let mut files: Vec<_> = fs::read_dir(Path::new(MIGRATIONS_DIR))
        .expect("read migrations dir")
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();
    files.sort();
    files
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.sql")
        .to_string()
}

fn strip_comments(sql: &str) -> String {
    sql.lines()
        .map(|line| line.split("--").next().unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn migration_names_are_timestamped() {
    let re = Regex::new(r"^\d{14}_[a-z0-9_]+\.sql$").unwrap();
    let files = migration_files();
    assert!(!files.is_empty(), "no migrations found");
    for path in files {
        let name = file_name(&path);
        assert!(re.is_match(&name), "badly named migration {name}");
    }
}

#[test]
fn ddl_targets_are_not_duplicated() {
    let create = Regex::new(
        r"(?i)create\s+(table|index)\s+(?:if\s+not\s+exists\s+)?[`'\x22]?([a-z_][a-z0-9_]*)",
    )
    .unwrap();
    let add_column =
        Regex::new(r"(?i)alter\s+table\s+([a-z_][a-z0-9_]*)\s+add\s+column\s+([a-z_][a-z0-9_]*)")
            .unwrap();

    let mut seen: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for path in migration_files() {
        let name = file_name(&path);
        let sql = strip_comments(&fs::read_to_string(&path).expect("read migration"));
        for cap in create.captures_iter(&sql) {
            let target = format!("{}:{}", cap[1].to_lowercase(), cap[2].to_lowercase());
            seen.entry(target).or_default().push(name.clone());
        }
        for cap in add_column.captures_iter(&sql) {
            let target = format!("column:{}:{}", cap[1].to_lowercase(), cap[2].to_lowercase());
            seen.entry(target).or_default().push(name.clone());
        }
    }
    let duplicates: Vec<_> = seen.iter().filter(|(_, files)| files.len() > 1).collect();
    assert!(
        duplicates.is_empty(),
        "duplicate migration DDL targets: {duplicates:?}"
    );
}

#[test]
fn millisecond_columns_are_integers() {
    let column = Regex::new(r"(?im)^\s*([a-z_]+_ms)\s+([a-z]+)").unwrap();
    for path in migration_files() {
        let sql = strip_comments(&fs::read_to_string(&path).expect("read migration"));
        for cap in column.captures_iter(&sql) {
            assert!(
                cap[2].eq_ignore_ascii_case("integer"),
                "{} declares {} as {}",
                file_name(&path),
                &cap[1],
                &cap[2]
            );
        }
    }
}
