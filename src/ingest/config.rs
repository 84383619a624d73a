// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::classify::{Category, CategoryRule, CategoryRules};

pub const ENV_PATH: &str = "CATEGORY_RULES_PATH";

#[derive(Debug, Deserialize)]
struct RulesFile {
    #[serde(default)]
    rules: Vec<CategoryRule>,
    fallback: Option<Category>,
}

/// Load a category rule table from an explicit path. Supports TOML or JSON:
///
/// ```toml
/// fallback = "announcement"
///
/// [[rules]]
/// category = "update"
/// keywords = ["update", "release notes", "patch"]
/// ```
pub fn load_rules_from(path: &Path) -> Result<CategoryRules> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading category rules from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_rules(&content, ext.as_str())
        .with_context(|| format!("parsing category rules in {}", path.display()))
}

/// Load rules using env var + fallbacks:
/// 1) $CATEGORY_RULES_PATH
/// 2) config/category_rules.toml
/// 3) config/category_rules.json
/// 4) built-in defaults
pub fn load_rules_default() -> Result<CategoryRules> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_rules_from(&pb);
        } else {
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/category_rules.toml");
    if toml_p.exists() {
        return load_rules_from(&toml_p);
    }
    let json_p = PathBuf::from("config/category_rules.json");
    if json_p.exists() {
        return load_rules_from(&json_p);
    }
    Ok(CategoryRules::default())
}

fn parse_rules(s: &str, hint_ext: &str) -> Result<CategoryRules> {
    let parsed: RulesFile = if hint_ext == "json" || s.trim_start().starts_with('{') {
        serde_json::from_str(s)?
    } else {
        toml::from_str(s)?
    };
    let fallback = parsed.fallback.unwrap_or(Category::Announcement);
    let rules = CategoryRules::new(parsed.rules, fallback);
    if rules.rules().is_empty() {
        return Err(anyhow!("category rule table has no usable keywords"));
    }
    Ok(rules)
}
