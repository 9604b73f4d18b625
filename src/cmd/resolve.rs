use std::time::Instant;

use anyhow::{Context, Result};

use reelscout::{ConfigStore, ContentDescriptor, Resolver};

pub async fn cmd_resolve(
    store: ConfigStore,
    descriptor: &ContentDescriptor,
    json: bool,
) -> Result<()> {
    let resolver = Resolver::new(store);
    let started = Instant::now();

    eprintln!("🎬 Resolving: {descriptor}");
    let links = resolver
        .resolve(descriptor)
        .await
        .context("Resolution failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&links)?);
        return Ok(());
    }

    if links.is_empty() {
        eprintln!("❌ No sources found");
        return Ok(());
    }

    for (i, link) in links.iter().enumerate() {
        println!(
            "{:>2}. {:<8} {:<5} {:<10} {}",
            i + 1,
            link.quality,
            link.kind.to_string(),
            link.provider,
            link.url
        );
        if !link.subtitles.is_empty() {
            let langs: Vec<_> = link.subtitles.iter().map(|s| s.language.as_str()).collect();
            println!("    subtitles: {}", langs.join(", "));
        }
    }
    eprintln!(
        "\n✅ {} links in {:.1}s",
        links.len(),
        started.elapsed().as_secs_f64()
    );

    Ok(())
}
