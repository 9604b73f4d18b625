use anyhow::{bail, Context, Result};
use clap::Subcommand;

use reelscout::stream::ProviderKind;
use reelscout::{ConfigStore, ProviderDefinition};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the current configuration as JSON
    Show,

    /// Discard the saved configuration and restore defaults
    Reset,

    /// Enable a provider
    Enable {
        /// Provider name
        name: String,
    },

    /// Disable a provider
    Disable {
        /// Provider name
        name: String,
    },

    /// Remove a provider definition
    Remove {
        /// Provider name
        name: String,
    },

    /// Add or replace a provider definition
    Add {
        /// Provider name
        name: String,

        /// Base URL of the provider
        #[arg(long)]
        domain: String,

        /// Lower runs first
        #[arg(long, default_value = "5")]
        priority: u32,

        /// Per-provider time budget in milliseconds
        #[arg(long, default_value = "20000")]
        timeout_ms: u64,
    },
}

pub async fn cmd_config(store: &ConfigStore, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = store.get().await?;
            println!("{}", serde_json::to_string_pretty(&*config)?);
        }
        ConfigAction::Reset => {
            store.clear().await?;
            store.get().await?;
            println!("✅ Configuration reset to defaults");
        }
        ConfigAction::Enable { name } => {
            if !store.set_provider_active(&name, true).await? {
                bail!("No provider named '{name}'");
            }
            println!("✅ Enabled {name}");
        }
        ConfigAction::Disable { name } => {
            if !store.set_provider_active(&name, false).await? {
                bail!("No provider named '{name}'");
            }
            println!("✅ Disabled {name}");
        }
        ConfigAction::Remove { name } => {
            if !store.remove_provider(&name).await? {
                bail!("No provider named '{name}'");
            }
            println!("✅ Removed {name}");
        }
        ConfigAction::Add {
            name,
            domain,
            priority,
            timeout_ms,
        } => {
            let url = url::Url::parse(&domain)
                .with_context(|| format!("Invalid domain '{domain}'"))?;
            if !matches!(url.scheme(), "http" | "https") {
                bail!("Domain must be an http(s) URL: {domain}");
            }
            if ProviderKind::from_name(&name).is_none() {
                eprintln!(
                    "⚠️  '{name}' is not a built-in provider; it will be skipped when resolving"
                );
            }
            store
                .add_provider(ProviderDefinition::new(&name, &domain, priority, timeout_ms))
                .await?;
            println!("✅ Saved {name} ({domain}, priority {priority})");
        }
    }
    Ok(())
}
