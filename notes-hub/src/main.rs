//! Notes Hub permission tool
//!
//! Inspects and edits page permissions stored in a JSON snapshot.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use notes_hub_core::{
    AccessBitmask, AccessControl, MemoryStore, PageId, Principal, ResolverConfig, TokenId, UserId,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "notes-hub")]
#[command(about = "Resolve and manage hierarchical page permissions")]
struct Cli {
    /// Snapshot holding pages and permission records
    #[arg(short, long, global = true, default_value = "notes.json")]
    data: PathBuf,

    /// Resolver limits as JSON, overrides NOTES_* environment variables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective access of a user or token on a page
    Resolve {
        #[arg(short, long)]
        page: u64,

        #[arg(short, long, conflicts_with = "token")]
        user: Option<u64>,

        #[arg(short, long, requires = "owner")]
        token: Option<u64>,

        /// Account the token was issued by
        #[arg(short, long)]
        owner: Option<u64>,
    },

    /// Check that a user holds the given access on a page and everything below it
    Verify {
        #[arg(short, long)]
        page: u64,

        #[arg(short, long)]
        user: u64,

        /// Flag names (read,write,...) or raw bits
        #[arg(short, long)]
        require: AccessBitmask,
    },

    /// List a page and its descendants, breadth first
    Subtree {
        #[arg(short, long)]
        page: u64,

        #[arg(long)]
        json: bool,
    },

    /// Grant or deny access to a user or token on a page
    Grant {
        #[arg(short, long)]
        page: u64,

        #[arg(short, long, conflicts_with = "token", required_unless_present = "token")]
        user: Option<u64>,

        #[arg(short, long)]
        token: Option<u64>,

        /// Flag names (read,write,inherit,deny,...) or raw bits
        #[arg(short, long)]
        access: AccessBitmask,
    },

    /// Remove a permission record
    Revoke {
        #[arg(short, long)]
        record: u64,

        /// The record belongs to a token
        #[arg(long)]
        token: bool,

        /// Revoke on behalf of this user, who needs moderate on the page
        #[arg(short, long)]
        actor: Option<u64>,
    },

    /// Render a raw access value
    Describe { access: AccessBitmask },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Commands::Describe { access } = cli.command {
        println!("{} ({})", access, access.bits());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => ResolverConfig::from_file(path)?,
        None => ResolverConfig::from_env()?,
    };
    let store = Arc::new(MemoryStore::load(&cli.data)?);
    info!(data = %cli.data.display(), pages = store.page_count(), "loaded snapshot");
    let acl = AccessControl::new(store.clone(), store.clone(), config);

    match cli.command {
        Commands::Resolve {
            page,
            user,
            token,
            owner,
        } => {
            let principal = match (user, token, owner) {
                (Some(user), None, _) => Principal::user(user),
                (None, Some(token), Some(owner)) => Principal::token(token, owner),
                _ => bail!("pass either --user or --token with --owner"),
            };
            let access = acl.effective_access(principal, PageId(page)).await?;
            println!("{} on page {}: {} ({})", principal, page, access, access.bits());
        }
        Commands::Verify {
            page,
            user,
            require,
        } => {
            acl.verify_subtree(UserId(user), PageId(page), require).await?;
            println!("user {} holds {} on page {} and all subnotes", user, require.capability_names(), page);
        }
        Commands::Subtree { page, json } => {
            let pages = acl.enumerate_subtree(PageId(page)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&pages)?);
            } else {
                for page in pages {
                    println!("{}\t{}\towner {}\t{}", page.id, page.parent_id, page.owner_id, page.name);
                }
            }
        }
        Commands::Grant {
            page,
            user,
            token,
            access,
        } => {
            let (id, access) = match (user, token) {
                (Some(user), _) => {
                    let record = acl.grant(PageId(page), UserId(user), access).await?;
                    (record.id, record.access)
                }
                (None, Some(token)) => {
                    let record = acl.grant_token(PageId(page), TokenId(token), access).await?;
                    (record.id, record.access)
                }
                (None, None) => bail!("pass either --user or --token"),
            };
            store.save(&cli.data)?;
            println!("record {}: {}", id, access);
        }
        Commands::Revoke {
            record,
            token,
            actor,
        } => {
            let page = match (actor.map(Principal::user), token) {
                (Some(actor), true) => acl.revoke_token_as(actor, record).await?.page_id,
                (Some(actor), false) => acl.revoke_as(actor, record).await?.page_id,
                (None, true) => acl.revoke_token(record).await?.page_id,
                (None, false) => acl.revoke(record).await?.page_id,
            };
            store.save(&cli.data)?;
            println!("removed record {} from page {}", record, page);
        }
        Commands::Describe { .. } => {}
    }

    Ok(())
}
