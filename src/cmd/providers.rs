use anyhow::Result;
use serde::Serialize;

use reelscout::{ConfigStore, ProviderRegistry};

#[derive(Serialize)]
struct ProviderRow<'a> {
    name: &'a str,
    registered: bool,
    domain: Option<&'a str>,
    priority: Option<u32>,
    active: bool,
    timeout_ms: Option<u64>,
}

pub async fn cmd_providers(store: &ConfigStore, json: bool) -> Result<()> {
    let config = store.get().await?;
    let registry = ProviderRegistry::builtin();

    let mut rows: Vec<ProviderRow<'_>> = registry
        .names()
        .into_iter()
        .map(|name| {
            let def = config.provider(name);
            ProviderRow {
                name,
                registered: true,
                domain: def.map(|d| d.domain.as_str()),
                priority: def.map(|d| d.priority),
                active: def.is_some_and(|d| d.active),
                timeout_ms: def.map(|d| d.timeout_ms),
            }
        })
        .collect();
    // configured but unknown to this build
    rows.extend(
        config
            .providers
            .iter()
            .filter(|d| !registry.contains(&d.name))
            .map(|d| ProviderRow {
                name: &d.name,
                registered: false,
                domain: Some(d.domain.as_str()),
                priority: Some(d.priority),
                active: d.active,
                timeout_ms: Some(d.timeout_ms),
            }),
    );
    rows.sort_by_key(|r| (r.priority.unwrap_or(u32::MAX), r.name));

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for row in &rows {
        let status = match (row.registered, row.domain.is_some(), row.active) {
            (false, _, _) => "unknown",
            (true, false, _) => "not configured",
            (true, true, true) => "active",
            (true, true, false) => "disabled",
        };
        let priority = row.priority.map_or_else(|| "-".to_string(), |p| p.to_string());
        let timeout = row
            .timeout_ms
            .map_or_else(|| "-".to_string(), |t| format!("{t}ms"));
        println!(
            "{:<10} {:<15} priority {:<3} timeout {:<8} {}",
            row.name,
            status,
            priority,
            timeout,
            row.domain.unwrap_or("")
        );
    }

    let stats = store.stats().await?;
    println!(
        "\n{} configured, {} active, {} disabled",
        stats.total, stats.active, stats.inactive
    );
    Ok(())
}
