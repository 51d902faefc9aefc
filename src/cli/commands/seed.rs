//! YAML fixtures. Top-level keys are resource names; each entry may carry a
//! `key` (a local handle) and a `parent` naming the key of a row in the
//! parent resource. Everything else is written as columns.
//!
//! ```yaml
//! brands:
//!   - key: acme
//!     name: Acme
//! categories:
//!   - parent: acme
//!     name: Tea
//! ```

use anyhow::{anyhow, bail, Context};
use clap::Args;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use uuid::Uuid;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::database::{Actor, Record, ResourceRepository, WriteMode};
use crate::resources::{ResourceDef, RESOURCES};
use crate::services::TenantService;

#[derive(Args, Debug, Clone)]
pub struct SeedArgs {
    #[arg(help = "Tenant name")]
    pub tenant: String,
    #[arg(help = "YAML fixture file")]
    pub file: PathBuf,
}

pub type Fixture = BTreeMap<String, Vec<Map<String, Value>>>;

/// Keys seen so far, per resource
#[derive(Debug, Default)]
pub struct KeyTable {
    ids: HashMap<(&'static str, String), Uuid>,
}

impl KeyTable {
    pub fn insert(&mut self, resource: &'static str, key: String, id: Uuid) {
        self.ids.insert((resource, key), id);
    }

    pub fn get(&self, resource: &'static str, key: &str) -> Option<Uuid> {
        self.ids.get(&(resource, key.to_string())).copied()
    }
}

pub fn parse_fixture(text: &str) -> anyhow::Result<Fixture> {
    let fixture: Fixture = serde_yaml::from_str(text).context("invalid fixture YAML")?;
    if let Some(unknown) = fixture.keys().find(|k| !RESOURCES.iter().any(|r| r.name == k.as_str())) {
        bail!("unknown resource '{}' in fixture", unknown);
    }
    Ok(fixture)
}

/// Strip `key`/`parent` from an entry and fill in the parent column
pub fn resolve_entry(
    def: &'static ResourceDef,
    mut entry: Map<String, Value>,
    keys: &KeyTable,
) -> anyhow::Result<(Option<String>, Value)> {
    let key = match entry.remove("key") {
        Some(Value::String(k)) => Some(k),
        Some(other) => Some(other.to_string()),
        None => None,
    };

    if let Some(parent_key) = entry.remove("parent") {
        let parent = def
            .parent
            .ok_or_else(|| anyhow!("{} has no parent resource", def.name))?;
        let parent_key = parent_key
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| parent_key.to_string());
        let id = keys
            .get(parent.resource, &parent_key)
            .ok_or_else(|| anyhow!("{}: unknown {} key '{}'", def.name, parent.resource, parent_key))?;
        entry.insert(parent.column.to_string(), json!(id));
    }

    Ok((key, Value::Object(entry)))
}

pub async fn handle(args: SeedArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let mut fixture = parse_fixture(&text)?;

    let service = TenantService::new().await?;
    let (tenant, pool) = service.tenant_pool(&args.tenant).await?;
    let actor = Actor::system("seed");

    let mut keys = KeyTable::default();
    let mut counts = Map::new();

    // Registry order lists parents before children
    for def in RESOURCES.iter() {
        let entries = match fixture.remove(def.name) {
            Some(entries) => entries,
            None => continue,
        };
        let repo = ResourceRepository::new(def, pool.clone());
        let total = entries.len();

        for (index, entry) in entries.into_iter().enumerate() {
            let (key, body) = resolve_entry(def, entry, &keys)?;
            let record = Record::from_json(def, body, WriteMode::Create)
                .with_context(|| format!("{}[{}]", def.name, index))?;
            let row = repo
                .create(record, &actor)
                .await
                .with_context(|| format!("{}[{}]", def.name, index))?;

            if let Some(key) = key {
                let id = row
                    .get("id")
                    .and_then(Value::as_str)
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .ok_or_else(|| anyhow!("{}[{}]: inserted row has no id", def.name, index))?;
                keys.insert(def.name, key, id);
            }
        }

        tracing::debug!("Seeded {} {}", total, def.name);
        counts.insert(def.name.to_string(), json!(total));
    }

    output_success(
        &output_format,
        &format!("Seeded tenant '{}' from {}", tenant.name, args.file.display()),
        Some(Value::Object(counts)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::find;

    const FIXTURE: &str = r#"
brands:
  - key: acme
    name: Acme
categories:
  - key: tea
    parent: acme
    name: Tea
    description: Loose leaf
"#;

    #[test]
    fn parses_fixture_and_rejects_unknown_resources() {
        let fixture = parse_fixture(FIXTURE).unwrap();
        assert_eq!(fixture["brands"].len(), 1);
        assert_eq!(fixture["categories"][0]["parent"], json!("acme"));

        let err = parse_fixture("widgets:\n  - name: x\n").unwrap_err();
        assert!(err.to_string().contains("widgets"));
    }

    #[test]
    fn parent_keys_become_foreign_keys() {
        let mut fixture = parse_fixture(FIXTURE).unwrap();
        let brand_id = Uuid::new_v4();
        let mut keys = KeyTable::default();
        keys.insert("brands", "acme".to_string(), brand_id);

        let entry = fixture.remove("categories").unwrap().remove(0);
        let (key, body) = resolve_entry(find("categories").unwrap(), entry, &keys).unwrap();

        assert_eq!(key.as_deref(), Some("tea"));
        assert_eq!(body["brand_id"], json!(brand_id));
        assert!(body.get("parent").is_none());
        assert!(body.get("key").is_none());
        assert!(Record::from_json(find("categories").unwrap(), body, WriteMode::Create).is_ok());
    }

    #[test]
    fn unresolved_parent_is_an_error() {
        let mut entry = Map::new();
        entry.insert("parent".to_string(), json!("missing"));
        entry.insert("name".to_string(), json!("Tea"));
        let err = resolve_entry(find("categories").unwrap(), entry, &KeyTable::default()).unwrap_err();
        assert!(err.to_string().contains("unknown brands key 'missing'"));

        let mut entry = Map::new();
        entry.insert("parent".to_string(), json!("x"));
        assert!(resolve_entry(find("brands").unwrap(), entry, &KeyTable::default()).is_err());
    }
}
