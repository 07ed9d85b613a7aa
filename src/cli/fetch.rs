//! Cached backend lookups: chunks, images, suggestions and references.

use std::sync::Arc;

use anyhow::{Context, Result};

use gyschat::auth::SessionStore;
use gyschat::cache::CacheService;
use gyschat::client::{BackendClient, Resolvers};
use gyschat::config::Config;
use gyschat::references::{extract_references, render_placeholders, Reference};

/// Backend client carrying the stored session token, if any.
pub(crate) fn backend_client(config: &Config) -> Result<BackendClient> {
    let client =
        BackendClient::new(&config.backend).with_context(|| "Failed to create backend client")?;
    let session = SessionStore::new()
        .load()
        .with_context(|| "Failed to read stored session")?;
    Ok(match session {
        Some(s) => client.with_access_token(s.access_token),
        None => client,
    })
}

fn resolvers(config: &Config) -> Result<(CacheService, Resolvers)> {
    let cache = CacheService::open(&config.cache).with_context(|| "Failed to open cache")?;
    let backend = Arc::new(backend_client(config)?);
    let resolvers = Resolvers::new(backend, &cache);
    Ok((cache, resolvers))
}

pub(crate) async fn cmd_chunk(config: &Config, id: &str) -> Result<()> {
    let (_cache, resolvers) = resolvers(config)?;
    let chunk = resolvers
        .chunks
        .get(id)
        .await
        .with_context(|| format!("Failed to fetch chunk '{}'", id))?;

    println!("File: {}", chunk.filename);
    if !chunk.fileurl.is_empty() {
        println!("URL:  {}", chunk.fileurl);
    }
    println!();
    println!("{}", chunk.content);
    Ok(())
}

pub(crate) async fn cmd_image(config: &Config, src: &str) -> Result<()> {
    let (_cache, resolvers) = resolvers(config)?;
    let resolved = resolvers
        .images
        .resolve(src)
        .await
        .with_context(|| format!("Failed to resolve image '{}'", src))?;
    println!("{}", resolved);
    Ok(())
}

pub(crate) async fn cmd_suggestions(config: &Config) -> Result<()> {
    let (_cache, resolvers) = resolvers(config)?;
    let suggestions = resolvers
        .suggestions
        .get()
        .await
        .with_context(|| "Failed to fetch suggestions")?;

    let suggestions = if suggestions.is_empty() {
        config.site.recommendation_questions.clone()
    } else {
        suggestions
    };
    for (i, q) in suggestions.iter().enumerate() {
        println!("{}. {}", i + 1, q);
    }
    Ok(())
}

/// Print references found in `text`, then the text with placeholders.
pub(crate) async fn cmd_refs(config: &Config, text: &str, offline: bool) -> Result<()> {
    let refs = extract_references(text);
    if refs.is_empty() {
        println!("No references found.");
    } else {
        let resolvers = if offline {
            None
        } else {
            Some(resolvers(config)?)
        };
        for reference in &refs {
            let label = match reference {
                Reference::Doc(_) => "doc",
                Reference::DocSummary(_) => "docsum",
                Reference::Link(_) => "link",
            };
            let detail = match (reference, &resolvers) {
                (Reference::Link(url), _) => url.clone(),
                (r, Some((_, res))) => {
                    let id = r.chunk_id().unwrap_or_default();
                    match res.chunks.get(id).await {
                        Ok(chunk) => format!("{} ({})", id, chunk.filename),
                        Err(e) => format!("{} (unresolved: {})", id, e),
                    }
                }
                (r, None) => r.chunk_id().unwrap_or_default().to_string(),
            };
            println!("- {:<7} {}", label, detail);
        }
        println!();
    }
    println!("{}", render_placeholders(text));
    Ok(())
}
