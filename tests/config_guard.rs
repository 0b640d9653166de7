// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use regex::Regex;
use scoutbot::app::config::Settings;
use std::fs;
use std::path::Path;

const CONFIG_FILES: [&str; 2] = ["config.example.toml", "config.toml"];

/// Fail CI if a committed config carries exchange credentials.
#[test]
fn no_committed_credentials_in_configs() {
    let key = Regex::new(r#"(?i)^\s*(api_key|api_secret|secret_key|api_secret_key)\s*="#).unwrap();
    let blob = Regex::new(r"[A-Za-z0-9]{64}").unwrap();
    for file in CONFIG_FILES {
        if !Path::new(file).exists() {
            continue;
        }
        let body = fs::read_to_string(file).expect("read config");
        for (idx, line) in body.lines().enumerate() {
            if key.is_match(line) || blob.is_match(line) {
                panic!("Credential-looking value in {} at line {}", file, idx + 1);
            }
        }
    }
}

#[test]
fn example_config_loads_and_validates() {
    let settings = Settings::load_with_path(Some("config.example.toml")).expect("load example");
    settings.validate().expect("example config is valid");
    assert!(!settings.paper_balances.is_empty());
}
