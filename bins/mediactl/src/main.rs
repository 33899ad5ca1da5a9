//! Operator CLI for Adopet attachment ledgers.
//!
//! Ids are the public UUIDs. Configuration comes from `config/` files and
//! `ADOPET__*` environment variables.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use adopet_core::media::{
    Attachment, MediaError, MediaService, NewParent, ParentKind, ParentRef, Placement,
};
use adopet_core::storage::{BlobUpload, StorageConfig, StorageService};
use adopet_db::{AttachmentLedgerRepository, ParentRepository, connect};
use adopet_shared::{AppConfig, AppError, types::AttachmentId};
use anyhow::{Context, anyhow, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

type Service = MediaService<AttachmentLedgerRepository, StorageService>;

/// Inspect and repair the media attached to pets and users.
#[derive(Parser, Debug)]
#[command(name = "mediactl", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report parents whose attachments are not ordered `0..n-1`.
    Audit,
    /// Show a parent's attachments in display order.
    List(ParentArgs),
    /// Upload a file for an existing parent.
    Attach {
        #[command(flatten)]
        parent: ParentArgs,
        /// File to upload.
        file: PathBuf,
        /// Zero-based slot; appended when omitted.
        slot: Option<u32>,
    },
    /// Create a pet from its first photos.
    CreatePet {
        /// Pet name.
        #[arg(long)]
        name: String,
        /// Pet species.
        #[arg(long)]
        species: String,
        /// Photos, in display order.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Create a user from their first avatar.
    CreateUser {
        /// User name.
        #[arg(long)]
        name: String,
        /// Login email.
        #[arg(long)]
        email: String,
        /// Avatars, in display order.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Make an attachment its parent's primary one.
    Promote(AttachmentArgs),
    /// Delete an attachment and its blob.
    Remove(AttachmentArgs),
    /// Delete a parent with all of its media.
    Destroy(ParentArgs),
}

#[derive(Args, Debug)]
struct ParentArgs {
    /// Kind of the owning entity.
    kind: KindArg,
    /// Public id of the owning entity.
    id: Uuid,
}

#[derive(Args, Debug)]
struct AttachmentArgs {
    #[command(flatten)]
    parent: ParentArgs,
    /// Public id of the attachment.
    attachment: AttachmentId,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Pet,
    User,
}

impl From<KindArg> for ParentKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Pet => Self::Pet,
            KindArg::User => Self::User,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adopet=debug,mediactl=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = AppConfig::load().context("Failed to load configuration")?;
    let db = connect(&config.database).await?;
    info!("Connected to database");

    let ledger = Arc::new(AttachmentLedgerRepository::new(db.clone()));
    let parents = ParentRepository::new(db);

    if matches!(cli.command, Command::Audit) {
        return audit(&ledger).await;
    }

    let storage = match &config.storage {
        Some(settings) => StorageService::from_config(StorageConfig::from_settings(settings)?)?,
        None => bail!("storage is not configured (set ADOPET__STORAGE__PROVIDER)"),
    };
    info!(
        provider = storage.provider_name(),
        bucket = storage.bucket(),
        "Storage configured"
    );
    let service: Service = MediaService::new(ledger, Arc::new(storage));

    match cli.command {
        Command::Audit => {}
        Command::List(args) => {
            let parent = resolve(&parents, &args).await?;
            let attachments = service.list_ordered(parent).await.map_err(report)?;
            print_listing(&service, &attachments);
        }
        Command::Attach { parent, file, slot } => {
            let folder = format!("{}s/{}", ParentKind::from(parent.kind).as_str(), parent.id);
            let parent = resolve(&parents, &parent).await?;
            let upload = read_upload(&file).await?;
            let attachment = service
                .attach(parent, &folder, upload, Placement::from(slot))
                .await
                .map_err(report)?;
            println!("{} at {}", attachment.external_id, attachment.order_index);
        }
        Command::CreatePet {
            name,
            species,
            files,
        } => create(&service, NewParent::pet(name, species), &files).await?,
        Command::CreateUser { name, email, files } => {
            create(&service, NewParent::user(name, email), &files).await?;
        }
        Command::Promote(args) => {
            let parent = resolve(&parents, &args.parent).await?;
            let attachments = service
                .promote_to_primary(parent, args.attachment)
                .await
                .map_err(report)?;
            print_listing(&service, &attachments);
        }
        Command::Remove(args) => {
            let parent = resolve(&parents, &args.parent).await?;
            let removal = service
                .remove(parent, args.attachment)
                .await
                .map_err(report)?;
            println!("removed {} from {}", removal.removed.path, removal.parent);
        }
        Command::Destroy(args) => {
            let parent = resolve(&parents, &args).await?;
            let teardown = service.destroy_parent(parent).await.map_err(report)?;
            println!("removed {} attachment(s)", teardown.removed.len());
            for key in &teardown.orphaned_keys {
                println!("orphaned blob: {key}");
            }
        }
    }

    Ok(())
}

async fn audit(ledger: &AttachmentLedgerRepository) -> anyhow::Result<()> {
    let violations = ledger.audit().await.map_err(report)?;
    if violations.is_empty() {
        println!("all parents are consistently ordered");
        return Ok(());
    }

    for violation in &violations {
        println!(
            "{}: {} attachment(s), {}",
            violation.parent, violation.count, violation.violation
        );
    }
    bail!("{} parent(s) with broken ordering", violations.len())
}

async fn create(service: &Service, parent: NewParent, files: &[PathBuf]) -> anyhow::Result<()> {
    let mut uploads = Vec::with_capacity(files.len());
    for file in files {
        uploads.push(read_upload(file).await?);
    }

    let kind = parent.kind();
    let creation = service
        .create_parent_with(parent, uploads)
        .await
        .map_err(report)?;
    println!("created {} {}", kind.as_str(), creation.external_id);
    print_listing(service, &creation.attachments);
    Ok(())
}

async fn resolve(parents: &ParentRepository, args: &ParentArgs) -> anyhow::Result<ParentRef> {
    let kind = ParentKind::from(args.kind);

    parents
        .resolve(kind, args.id)
        .await?
        .ok_or_else(|| anyhow!("{} {} not found", kind.as_str(), args.id))
}

async fn read_upload(path: &Path) -> anyhow::Result<BlobUpload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("invalid file name: {}", path.display()))?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();

    Ok(BlobUpload::new(bytes, filename, mime.essence_str()))
}

fn print_listing(service: &Service, attachments: &[Attachment]) {
    for attachment in attachments {
        let marker = if attachment.is_primary() { "*" } else { " " };
        let location = service
            .public_url(attachment)
            .unwrap_or_else(|| attachment.path.clone());
        println!(
            "{marker} {:>3}  {}  {}  {}",
            attachment.order_index, attachment.external_id, attachment.mime_type, location
        );
    }
}

/// Attach the client-facing error code to a media error.
fn report(err: MediaError) -> anyhow::Error {
    let err = AppError::from(err);
    if err.is_transient() {
        warn!("Transient failure, the command may be retried");
    }
    anyhow!("[{}] {err}", err.error_code())
}
