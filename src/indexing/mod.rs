//! Indexing pass: describe, embed and store every registered tool.
//!
//! All embeddings are computed before the store is touched, then every upsert
//! and the catalog digest land in a single transaction. A failure at any
//! point leaves the index as it was.

use crate::embeddings::{EmbeddingError, EmbeddingProvider};
use crate::persistence::{StoreError, ToolIndexStore, ToolRecord};
use crate::tools::{describe, DescribeError, ToolDescription, ToolRegistry};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::time::Instant;
use thiserror::Error;

/// `index_meta` key holding the digest of the last indexed catalog.
pub const CATALOG_DIGEST_KEY: &str = "catalog_digest";

#[derive(Error, Debug)]
pub enum IndexError {
    #[error(transparent)]
    Describe(#[from] DescribeError),

    #[error("failed to embed tool {tool:?}: {source}")]
    Embedding {
        tool: String,
        #[source]
        source: EmbeddingError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub indexed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub digest: String,
    pub elapsed_ms: u64,
}

/// Whether the stored index matches the running catalog.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub catalog_digest: String,
    pub indexed_digest: Option<String>,
    pub live_rows: usize,
    /// Catalog tools with no live row, e.g. after `retire`.
    pub missing: Vec<String>,
    pub fresh: bool,
}

/// SHA-256 over the embedding model and every description, hex encoded.
///
/// Any change to a tool's text, its schema, the catalog order or the model
/// changes the digest.
pub fn catalog_digest(model: &str, descriptions: &[ToolDescription]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update(b"\n");

    for description in descriptions {
        hasher.update(description.text.as_bytes());
        hasher.update(b"|");
        if let Some(schema) = &description.input_schema {
            hasher.update(schema.as_bytes());
        }
        hasher.update(b"\n");
    }

    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn describe_all(registry: &ToolRegistry) -> Result<Vec<(String, ToolDescription)>, IndexError> {
    registry
        .all_tools()
        .iter()
        .map(|def| Ok((def.name.clone(), describe(def)?)))
        .collect()
}

/// Index every registered tool.
pub async fn index_catalog(
    registry: &ToolRegistry,
    provider: &dyn EmbeddingProvider,
    store: &ToolIndexStore,
) -> Result<IndexReport, IndexError> {
    let start = Instant::now();
    let described = describe_all(registry)?;
    let digest = catalog_digest(
        provider.model_name(),
        &described.iter().map(|(_, d)| d.clone()).collect::<Vec<_>>(),
    );

    let mut records = Vec::with_capacity(described.len());
    for (name, description) in described {
        let embedding = provider
            .embed(&description.text)
            .await
            .map_err(|source| IndexError::Embedding {
                tool: name.clone(),
                source,
            })?;
        tracing::debug!(tool = %name, dimensions = embedding.len(), "Tool embedded");

        records.push(ToolRecord {
            name,
            description: description.text,
            embedding,
            input_schema: description.input_schema,
        });
    }

    let store = store.clone();
    let tx_digest = digest.clone();
    let outcomes = tokio::task::spawn_blocking(move || {
        store.with_transaction(|tx| {
            let mut outcomes = Vec::with_capacity(records.len());
            for record in &records {
                outcomes.push(store.upsert_tx(tx, record)?);
            }
            store.set_meta_tx(tx, CATALOG_DIGEST_KEY, &tx_digest)?;
            Ok(outcomes)
        })
    })
    .await
    .map_err(|e| StoreError::Task(e.to_string()))??;

    // A fresh insert stamps both timestamps with the same value.
    let inserted = outcomes
        .iter()
        .filter(|o| o.created_at == o.updated_at)
        .count();

    let report = IndexReport {
        indexed: outcomes.len(),
        inserted,
        updated: outcomes.len() - inserted,
        digest,
        elapsed_ms: start.elapsed().as_millis() as u64,
    };

    metrics::counter!("index_tools_total").increment(report.indexed as u64);
    tracing::info!(
        indexed = report.indexed,
        inserted = report.inserted,
        updated = report.updated,
        elapsed_ms = report.elapsed_ms,
        "Tool catalog indexed"
    );

    Ok(report)
}

/// Compare the running catalog against the last indexing pass. Blocking.
pub fn index_status(
    registry: &ToolRegistry,
    model: &str,
    store: &ToolIndexStore,
) -> Result<IndexStatus, IndexError> {
    let (names, descriptions): (Vec<String>, Vec<ToolDescription>) =
        describe_all(registry)?.into_iter().unzip();
    let catalog_digest = catalog_digest(model, &descriptions);
    let indexed_digest = store.get_meta(CATALOG_DIGEST_KEY)?;

    let live: HashSet<String> = store.list()?.into_iter().map(|t| t.name).collect();
    let missing: Vec<String> = names.into_iter().filter(|n| !live.contains(n)).collect();

    Ok(IndexStatus {
        fresh: missing.is_empty() && indexed_digest.as_deref() == Some(catalog_digest.as_str()),
        catalog_digest,
        indexed_digest,
        live_rows: live.len(),
        missing,
    })
}
