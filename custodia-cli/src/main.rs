//! `custodia` CLI: key management, hashing and field encryption against a
//! local key directory.

#![warn(clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use custodia::config::DEFAULT_TABLE_NAME;
use custodia::prelude::*;
use custodia_key_file::{FileKms, CURRENT_KEY_ALIAS};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "custodia")]
#[command(about = "Customer PII encryption toolkit", long_about = None)]
struct Cli {
    /// TOML settings file; `CUSTODIA_*` variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a key directory, or add a new current KEK to an existing one
    Keygen {
        /// Key directory
        #[arg(short, long, default_value = "./keys")]
        dir: PathBuf,
    },
    /// Print the lookup hash of a document number or email
    Hash {
        /// Which index the value is for
        #[arg(short, long, value_enum)]
        index: IndexArg,
        value: String,
    },
    /// Encrypt a single field value
    Encrypt {
        #[command(flatten)]
        field: FieldArgs,
        /// KEK id, or "current"
        #[arg(long, default_value = CURRENT_KEY_ALIAS)]
        key_id: String,
        value: String,
    },
    /// Decrypt a single field token
    Decrypt {
        #[command(flatten)]
        field: FieldArgs,
        token: String,
    },
    /// Register a sample customer in memory and look it up again
    Demo {
        /// Key directory
        #[arg(short, long, default_value = "./keys")]
        dir: PathBuf,
    },
}

#[derive(clap::Args)]
struct FieldArgs {
    /// Key directory
    #[arg(short, long, default_value = "./keys")]
    dir: PathBuf,
    /// Table the field belongs to
    #[arg(long, default_value = DEFAULT_TABLE_NAME)]
    table: String,
    /// Column the field belongs to, e.g. "email"
    #[arg(long)]
    column: String,
}

impl FieldArgs {
    fn cipher(&self, key_id: Option<String>) -> Result<(FieldCipher<FileKms>, FieldContext)> {
        let kms = FileKms::open(&self.dir)
            .with_context(|| format!("opening key directory {}", self.dir.display()))?;
        Ok((FieldCipher::new(kms, key_id), FieldContext::new(&self.table, &self.column)))
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum IndexArg {
    DocumentNumber,
    Email,
}

impl From<IndexArg> for HashIndex {
    fn from(arg: IndexArg) -> Self {
        match arg {
            IndexArg::DocumentNumber => Self::DocumentNumber,
            IndexArg::Email => Self::Email,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let load_settings = || Settings::load(cli.config.as_deref()).context("loading settings");

    match cli.command {
        Commands::Keygen { dir } => {
            let kek_id = if dir.is_dir() {
                FileKms::open(&dir)?.create_kek()?
            } else {
                FileKms::init(&dir)?.current_kek_id()?
            };
            info!(dir = %dir.display(), "key directory ready");
            println!("{kek_id}");
        }
        Commands::Hash { index, value } => {
            let hasher = HashingService::from_settings(&load_settings()?)?;
            println!("{}", hasher.index_key(index.into(), &value)?.as_str());
        }
        Commands::Encrypt { field, key_id, value } => {
            let (cipher, ctx) = field.cipher(Some(key_id))?;
            println!("{}", cipher.encrypt(&value, &ctx).await?.as_str());
        }
        Commands::Decrypt { field, token } => {
            let (cipher, ctx) = field.cipher(None)?;
            println!("{}", cipher.decrypt(&Ciphertext::from_token(token), &ctx).await?);
        }
        Commands::Demo { dir } => demo(load_settings()?, dir).await?,
    }

    Ok(())
}

async fn demo(settings: Settings, dir: PathBuf) -> Result<()> {
    let settings = if settings.kms_key_id().is_some() {
        settings
    } else {
        settings.with_kms_key_id(CURRENT_KEY_ALIAS)
    };
    let kms = FileKms::open(&dir).with_context(|| format!("opening key directory {}", dir.display()))?;
    let store = Arc::new(MemoryRecordStore::new());
    let service = CustomerService::from_settings(Arc::new(kms), Arc::clone(&store), &settings)?;

    let customer = NewCustomer {
        first_name: "Jane".to_string(),
        last_name: "Smith".to_string(),
        document_number: "987.654.321-00".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1985, 5, 20).context("sample date")?,
        email: "jane.smith@example.com".to_string(),
        phone_number: "11987654321".to_string(),
        address: Address {
            street: "Avenida Paulista".to_string(),
            house_number: "1578".to_string(),
            city: "São Paulo".to_string(),
            state: "SP".to_string(),
            postal_code: "01310200".to_string(),
            country: "Brazil".to_string(),
        },
    };

    let created = service.create(customer.clone()).await?;
    info!(customer_id = %created.id, "sample customer created");

    match service.create(customer).await {
        Err(ServiceError::Validation(messages)) => info!(?messages, "duplicate rejected"),
        other => anyhow::bail!("duplicate was not rejected: {:?}", other.map(|c| c.id)),
    }

    let found = service.find_by_document_number("98765432100").await?;
    let stored = store.get(&found.id).await?.context("stored record")?;
    println!("{}", serde_json::to_string_pretty(&stored)?);
    println!("{}", serde_json::to_string_pretty(&CustomerView::from(&found))?);
    Ok(())
}
