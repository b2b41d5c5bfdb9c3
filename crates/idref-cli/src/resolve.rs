//! # Resolve Subcommand
//!
//! Runs one handler set over every id in a JSON document of the form
//! `{"<object>": {"<id type>": ["id", ...]}}` and prints the remapped ids in
//! the same shape, in input order.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use idref_core::{AuthToken, IdReference, IdReferenceHandlerSetFactoryBuilder, IdReferenceType};

/// Object key, then id type, then ids.
pub type IdDocument = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Arguments for `idref resolve`.
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// User name the token belongs to.
    #[arg(long)]
    pub user: String,

    /// Environment variable holding the user's token.
    #[arg(long, default_value = "IDREF_TOKEN")]
    pub token_env: String,

    /// JSON document listing the ids found in each object.
    #[arg(long)]
    pub document: PathBuf,
}

impl ResolveArgs {
    fn token(&self) -> Result<AuthToken> {
        let Ok(token) = std::env::var(&self.token_env) else {
            bail!("environment variable {} is not set", self.token_env);
        };
        Ok(AuthToken::new(token, self.user.as_str())?)
    }
}

pub fn run_resolve(
    args: &ResolveArgs,
    registry: &IdReferenceHandlerSetFactoryBuilder<String>,
    out: &mut dyn Write,
) -> Result<u8> {
    let text = std::fs::read_to_string(&args.document)
        .with_context(|| format!("failed to read {}", args.document.display()))?;
    let document: IdDocument =
        serde_json::from_str(&text).with_context(|| format!("failed to parse {}", args.document.display()))?;
    let resolved = resolve_document(&document, args.token()?, registry)?;
    serde_json::to_writer_pretty(&mut *out, &resolved).context("failed to write resolved ids")?;
    writeln!(out)?;
    Ok(0)
}

/// Resolve every id in `document` with a single handler set.
pub fn resolve_document(
    document: &IdDocument,
    token: AuthToken,
    registry: &IdReferenceHandlerSetFactoryBuilder<String>,
) -> Result<IdDocument> {
    let mut set = registry.factory(token).create_handlers();
    let mut types = BTreeMap::new();
    for (object, ids_by_type) in document {
        for (type_name, ids) in ids_by_type {
            let id_type = IdReferenceType::new(type_name.as_str())?;
            for id in ids {
                let reference = IdReference::new(id_type.clone(), object.clone(), id.as_str(), None)
                    .with_context(|| format!("bad id in object {object}"))?;
                set.add_id(&reference)?;
            }
            types.insert(type_name.as_str(), id_type);
        }
    }
    tracing::debug!(objects = document.len(), references = set.size(), "resolving document");
    set.process_ids()?;

    let mut resolved = IdDocument::new();
    for (object, ids_by_type) in document {
        let out = resolved.entry(object.clone()).or_default();
        for (type_name, ids) in ids_by_type {
            let id_type = &types[type_name.as_str()];
            let remapped = ids
                .iter()
                .map(|id| Ok(set.remapped_id(id_type, id)?.into_inner()))
                .collect::<Result<Vec<_>>>()?;
            out.insert(type_name.clone(), remapped);
        }
    }
    Ok(resolved)
}
