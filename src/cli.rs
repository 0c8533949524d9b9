//! Command line interface
//!
//! Every command prints its result as pretty JSON on stdout.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::config::HubConfig;
use crate::policy::catalog::Catalog;
use crate::policy::error::CatalogError;
use crate::policy::repository::PolicyRepository;
use crate::policy::store::PolicyStore;
use crate::policy::types::{DocPage, NewPolicyVersion, PolicyFilters, ResolveRequest};

#[derive(Debug, Parser)]
#[command(name = "policy-hub")]
#[command(version, about = "Catalog and version resolver for policy artifacts")]
pub struct Cli {
    /// SQLite database to use instead of the configured one
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Configuration file (defaults to config.json in the data directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the latest version of every policy
    List(ListArgs),

    /// List all versions of a policy, newest first
    Versions {
        name: String,
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long, default_value_t = 20)]
        page_size: i64,
    },

    /// Show a policy version (the latest one when no version is given)
    Show { name: String, version: Option<String> },

    /// Print the definition payload of a version
    Definition { name: String, version: String },

    /// Print documentation of a version
    Docs {
        name: String,
        version: String,
        /// Single page to print (overview, configuration, examples, faq)
        #[arg(long)]
        page: Option<String>,
    },

    /// Resolve requests written as NAME@VERSION or NAME@VERSION:STRATEGY
    Resolve(ResolveArgs),

    /// Publish a new version from a JSON manifest
    Publish {
        /// Manifest with the version fields and an optional "docs" object
        manifest: PathBuf,
    },

    /// List distinct categories, providers and platforms
    Facets,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Substring matched against name, display name and description
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long = "category")]
    pub categories: Vec<String>,
    #[arg(long = "provider")]
    pub providers: Vec<String>,
    #[arg(long = "platform")]
    pub platforms: Vec<String>,
    #[arg(long, default_value_t = 1)]
    pub page: i64,
    #[arg(long, default_value_t = 20)]
    pub page_size: i64,
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    #[arg(value_parser = parse_request_spec)]
    pub requests: Vec<ResolveRequest>,

    /// JSON file holding an array of {name, version, versionResolution}
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Pair every request with its result instead of printing the bare set
    #[arg(long)]
    pub correlated: bool,
}

/// A version to publish together with its documentation pages
#[derive(Debug, Deserialize)]
struct PublishManifest {
    #[serde(flatten)]
    version: NewPolicyVersion,
    #[serde(default)]
    docs: IndexMap<DocPage, String>,
}

/// Parse `NAME@VERSION[:STRATEGY]`
pub fn parse_request_spec(spec: &str) -> Result<ResolveRequest, String> {
    let (name, rest) = spec
        .split_once('@')
        .ok_or_else(|| format!("expected NAME@VERSION[:STRATEGY], got '{spec}'"))?;
    let (version, strategy) = match rest.split_once(':') {
        Some((version, strategy)) => (version, Some(strategy)),
        None => (rest, None),
    };

    Ok(ResolveRequest::new(name, version, strategy))
}

/// Open the store and run the command
pub async fn run(cli: Cli, config: HubConfig) -> anyhow::Result<()> {
    let db_path = cli.db.clone().unwrap_or_else(|| config.database_path());
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    info!("Opening policy database at {:?}", db_path);
    let store = PolicyStore::new(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    let catalog = Catalog::new(Arc::new(store), config.resolve.max_batch_size);

    let output = execute(&catalog, &config, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Run a command against a catalog and return its JSON output
pub async fn execute<R>(catalog: &Catalog<R>, config: &HubConfig, command: Command) -> anyhow::Result<Value>
where
    R: PolicyRepository + ?Sized,
{
    let output = match command {
        Command::List(args) => {
            let filters = PolicyFilters {
                search: args.search,
                categories: args.categories,
                providers: args.providers,
                platforms: args.platforms,
                page: args.page,
                page_size: args.page_size,
            };
            serde_json::to_value(catalog.list_policies(&filters).await?)?
        }
        Command::Versions {
            name,
            page,
            page_size,
        } => serde_json::to_value(catalog.list_versions(&name, page, page_size).await?)?,
        Command::Show { name, version } => {
            let found = match version {
                Some(version) => catalog.get_version(&name, &version).await?,
                None => catalog.get_latest_version(&name).await?,
            };
            serde_json::to_value(found)?
        }
        Command::Definition { name, version } => {
            let definition = catalog.get_definition(&name, &version).await?;
            // Definitions are usually JSON; anything else is printed as a string
            serde_json::from_str(&definition).unwrap_or(Value::String(definition))
        }
        Command::Docs {
            name,
            version,
            page: Some(page),
        } => Value::String(catalog.get_doc(&name, &version, &page).await?),
        Command::Docs {
            name,
            version,
            page: None,
        } => serde_json::to_value(catalog.get_all_docs(&name, &version).await?)?,
        Command::Resolve(args) => resolve(catalog, config, args).await?,
        Command::Publish { manifest } => {
            let content = std::fs::read_to_string(&manifest)
                .with_context(|| format!("Failed to read manifest {}", manifest.display()))?;
            let manifest: PublishManifest = serde_json::from_str(&content)
                .with_context(|| format!("Invalid manifest {}", manifest.display()))?;
            serde_json::to_value(catalog.publish(manifest.version, &manifest.docs).await?)?
        }
        Command::Facets => serde_json::to_value(catalog.facets().await?)?,
    };

    Ok(output)
}

async fn resolve<R>(catalog: &Catalog<R>, config: &HubConfig, args: ResolveArgs) -> anyhow::Result<Value>
where
    R: PolicyRepository + ?Sized,
{
    let mut requests = args.requests;
    if let Some(file) = &args.file {
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read requests {}", file.display()))?;
        let from_file: Vec<ResolveRequest> = serde_json::from_str(&content)
            .with_context(|| format!("Invalid requests file {}", file.display()))?;
        requests.extend(from_file);
    }

    let timeout = Duration::from_millis(config.resolve.timeout_ms);
    let resolver = catalog.resolver();

    let output = if args.correlated {
        let resolutions = tokio::time::timeout(timeout, resolver.resolve_correlated(&requests))
            .await
            .map_err(|_| CatalogError::Timeout {
                timeout_ms: config.resolve.timeout_ms,
            })??;
        serde_json::to_value(resolutions)?
    } else {
        serde_json::to_value(resolver.resolve_with_timeout(&requests, timeout).await?)?
    };

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("jwt@1.2.3", ResolveRequest::new("jwt", "1.2.3", None))]
    #[case("jwt@v1.2:patch", ResolveRequest::new("jwt", "v1.2", Some("patch")))]
    #[case("rate-limit@2:minor", ResolveRequest::new("rate-limit", "2", Some("minor")))]
    #[case("cors@:major", ResolveRequest::new("cors", "", Some("major")))]
    fn parse_request_spec_splits_parts(#[case] spec: &str, #[case] expected: ResolveRequest) {
        assert_eq!(parse_request_spec(spec).unwrap(), expected);
    }

    #[test]
    fn parse_request_spec_requires_version_separator() {
        assert!(parse_request_spec("jwt").is_err());
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "policy-hub",
            "resolve",
            "jwt@1.0.0",
            "cors@1.2:patch",
            "--correlated",
            "--db",
            "/tmp/policies.db",
        ])
        .unwrap();

        assert_eq!(cli.db, Some(PathBuf::from("/tmp/policies.db")));
        match cli.command {
            Command::Resolve(args) => {
                assert!(args.correlated);
                assert_eq!(args.requests.len(), 2);
                assert_eq!(args.requests[1].version_resolution.as_deref(), Some("patch"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_repeated_list_filters() {
        let cli = Cli::try_parse_from([
            "policy-hub",
            "list",
            "--category",
            "security",
            "--category",
            "traffic",
            "--page-size",
            "5",
        ])
        .unwrap();

        match cli.command {
            Command::List(args) => {
                assert_eq!(args.categories, vec!["security", "traffic"]);
                assert_eq!(args.page_size, 5);
                assert_eq!(args.page, 1);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn publish_manifest_reads_docs_by_page() {
        let manifest: PublishManifest = serde_json::from_str(
            r##"{
                "policyName": "jwt",
                "version": "1.0.0",
                "provider": "acme",
                "docs": { "overview": "# JWT", "faq": "none" }
            }"##,
        )
        .unwrap();

        assert_eq!(manifest.version.policy_name, "jwt");
        assert_eq!(manifest.docs[&DocPage::Overview], "# JWT");
        assert_eq!(manifest.docs.len(), 2);
    }

    #[test]
    fn publish_manifest_rejects_unknown_doc_page() {
        let result = serde_json::from_str::<PublishManifest>(
            r#"{ "policyName": "jwt", "version": "1.0.0", "docs": { "changelog": "x" } }"#,
        );

        assert!(result.is_err());
    }
}
