//! Quire - command-line front-end for the content repository.
//!
//! Every command prints JSON on stdout; logs go to stderr.

mod output;

use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use quire_config::Config;
use quire_content::models::{ContentUpdate, NewContent};
use quire_content::registry::{
    ContentTypeRegistry, NewContentType, NewCustomField, Registries, SqliteContentTypes, SqliteCustomFields,
};
use quire_content::{Database, Filter, Repository};
use std::fmt::Debug;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Parser)]
#[command(name = "quire", version, about)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,
    /// Override the configured database path
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    /// Override the configured site base URL
    #[arg(long, global = true)]
    site_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register a content type and create its extension table
    TypeAdd {
        /// Plural display name, e.g. "Blog Posts"
        #[arg(long)]
        name: String,
        /// Singular display name, e.g. "Blog Post"
        #[arg(long)]
        singular: String,
        /// Extension table name, e.g. "blog_posts"
        #[arg(long)]
        system: String,
        /// Custom field as `name=Friendly Name` (repeatable)
        #[arg(long = "field", value_parser = parse_pair)]
        fields: Vec<(String, String)>,
    },
    /// Add a custom field to an existing content type
    FieldAdd {
        #[arg(long = "type")]
        type_id: u64,
        #[arg(long)]
        name: String,
        #[arg(long)]
        friendly: String,
    },
    /// List registered content types
    Types,
    /// Create a content record
    Create {
        #[arg(long = "type")]
        type_id: u64,
        #[arg(long)]
        author: u64,
        #[command(flatten)]
        body: Body,
    },
    /// Update a content record
    Update {
        id: u64,
        #[command(flatten)]
        body: Body,
    },
    /// Delete a content record
    Delete { id: u64 },
    /// Show a single content record
    Get { id: u64 },
    /// List content records
    List {
        /// Filter as `key=value` (repeatable), e.g. `type=2` or `author_like=jo`
        #[arg(long = "filter", short, value_parser = parse_pair)]
        filters: Vec<(String, String)>,
    },
}

/// Fields shared by `create` and `update`.
#[derive(Debug, Args)]
struct Body {
    #[arg(long, default_value = "")]
    title: String,
    /// URL path hint, slugified before use
    #[arg(long)]
    path: Option<String>,
    #[arg(long = "topic")]
    topics: Vec<u64>,
    #[arg(long = "privilege")]
    privileges: Vec<u64>,
    /// Custom field value as `name=value` (repeatable)
    #[arg(long = "field", value_parser = parse_pair)]
    fields: Vec<(String, String)>,
}

fn parse_pair(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got {s:?}"))
}

/// Render an error tree from one of the workspace crates as a report.
trait Report<T> {
    fn report(self) -> Result<T>;
}
impl<T, E: Debug> Report<T> for std::result::Result<T, E> {
    fn report(self) -> Result<T> {
        self.map_err(|e| miette!("{e:?}"))
    }
}

impl Cli {
    /// Load configuration and apply command-line overrides. Runs before the
    /// subscriber exists, so it must not rely on logging.
    fn config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref()).report()?;
        if let Some(path) = &self.database {
            config.database.path = path.clone();
        }
        if let Some(url) = &self.site_url {
            config.site.base_url = url.clone();
        }
        config.validate().report()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    tracing::debug!(
        config = ?cli.config,
        database = %config.database.path.display(),
        site_url = %config.site.base_url,
        "Loaded configuration"
    );

    if let Some(parent) = config.database.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).into_diagnostic()?;
    }
    let db = Database::connect_with_limit(&config.database.path, config.database.max_connections)
        .await
        .report()?;
    let result = run(cli.command, &db, &config).await;
    db.close().await;
    println!("{}", serde_json::to_string_pretty(&result?).into_diagnostic()?);
    Ok(())
}

async fn run(command: Command, db: &Database, config: &Config) -> Result<serde_json::Value> {
    tracing::debug!(?command, "Running command");
    let repo = Repository::new(db.pool().clone(), Registries::default(), &config.site.base_url);
    Ok(match command {
        Command::TypeAdd { name, singular, system, fields } => {
            let new = fields
                .into_iter()
                .fold(NewContentType::new(name, singular, system), |new, (field, friendly)| {
                    new.with_field(NewCustomField::new(field, friendly))
                });
            output::content_type(&SqliteContentTypes.create(db.pool(), &new).await.report()?)
        },
        Command::FieldAdd { type_id, name, friendly } => {
            let mut conn = db.pool().acquire().await.into_diagnostic()?;
            let content_type = SqliteContentTypes.resolve(&mut conn, type_id).await.report()?;
            drop(conn);
            let content_type = content_type.ok_or_else(|| miette!("unknown content type {type_id}"))?;
            let field = SqliteCustomFields
                .add(db.pool(), &content_type, &NewCustomField::new(name, friendly))
                .await
                .report()?;
            output::custom_field(&field)
        },
        Command::Types => {
            let types = SqliteContentTypes.list(db.pool()).await.report()?;
            types.iter().map(output::content_type).collect()
        },
        Command::Create { type_id, author, body } => {
            let new = NewContent {
                title: body.title,
                url_path: body.path,
                topics: body.topics.into_iter().collect(),
                privileges: body.privileges.into_iter().collect(),
                custom_fields: body.fields.into_iter().collect(),
                ..NewContent::new(type_id, author)
            };
            let id = repo.create(&new).await.report()?;
            let id = id.ok_or_else(|| miette!("unknown content type {type_id}"))?;
            serde_json::json!({ "id": id })
        },
        Command::Update { id, body } => {
            let update = ContentUpdate {
                url_path: body.path,
                topics: body.topics.into_iter().collect(),
                privileges: body.privileges.into_iter().collect(),
                custom_fields: body.fields.into_iter().collect(),
                ..ContentUpdate::new(body.title)
            };
            serde_json::json!({ "id": id, "updated": repo.update(id, &update).await.report()? })
        },
        Command::Delete { id } => serde_json::json!({ "id": id, "deleted": repo.delete(id).await.report()? }),
        Command::Get { id } => repo.get(id).await.report()?.as_ref().map(output::content).unwrap_or_default(),
        Command::List { filters } => {
            let filter = Filter::from_pairs(filters).report()?;
            let views = repo.list(&filter).await.report()?.unwrap_or_default();
            views.iter().map(output::content).collect()
        },
    })
}
