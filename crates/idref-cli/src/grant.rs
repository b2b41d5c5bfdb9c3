//! # Grant Subcommand
//!
//! Grants read access to ids of one type, either to a named user or to
//! everyone.

use std::io::Write;

use anyhow::{Context, Result};
use clap::{ArgGroup, Args};
use idref_core::{AssociatedObject, IdReferenceHandlerSetFactoryBuilder, IdReferenceType, ReadGrantee};

/// Arguments for `idref grant`.
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("grantee").required(true).args(["user", "public"])))]
pub struct GrantArgs {
    /// The id type, e.g. `handle`, `shock` or `sample`.
    #[arg(long = "type")]
    pub id_type: String,

    /// Grant read access to this user.
    #[arg(long)]
    pub user: Option<String>,

    /// Make the ids publicly readable.
    #[arg(long)]
    pub public: bool,

    /// The ids to share.
    #[arg(required = true)]
    pub ids: Vec<String>,
}

impl GrantArgs {
    pub fn grantee(&self) -> ReadGrantee {
        match &self.user {
            Some(u) => ReadGrantee::User(u.clone()),
            None => ReadGrantee::Public,
        }
    }
}

pub fn run_grant<T: AssociatedObject>(
    args: &GrantArgs,
    registry: &IdReferenceHandlerSetFactoryBuilder<T>,
    out: &mut dyn Write,
) -> Result<u8> {
    let id_type = IdReferenceType::new(args.id_type.as_str())?;
    let grantee = args.grantee();
    let mut permissions = registry.create_permission_handler(grantee.clone());
    permissions
        .add_read_permission(&id_type, &args.ids)
        .with_context(|| format!("failed to grant read access on {} ids", id_type))?;
    tracing::info!(id_type = %id_type, ids = args.ids.len(), grantee = %grantee, "granted read access");
    writeln!(out, "OK: granted {} read access to {} {} id(s)", grantee, args.ids.len(), id_type)?;
    Ok(0)
}
