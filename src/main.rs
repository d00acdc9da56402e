//! CorpPass service provider tool
//!
//! Offline checks for AuthAccess payloads and SAML responses, live artifact
//! resolution, and IdP redirect URL generation.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use corppass_sp::saml::{decryptor_from_config, SamlResponse};
use corppass_sp::{
    ArtifactOrchestrator, ArtifactRequest, AuthAccess, CorppassConfig, HttpArtifactResolver,
    ResponseValidator, ServiceProvider, TracingNotifier,
};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "corppass-sp")]
#[command(about = "CorpPass SAML artifact service provider")]
struct Args {
    /// Path to the JSON service provider configuration
    #[arg(long, short, env = "CORPPASS_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, env = "CORPPASS_VERBOSE")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate an AuthAccess document
    CheckPayload {
        /// AuthAccess XML file
        file: PathBuf,
    },

    /// Validate a SAML response against the configuration at the current time
    CheckResponse {
        /// SAML Response XML file (bare or inside an ArtifactResponse)
        file: PathBuf,
    },

    /// Resolve an artifact against the IdP and validate the result
    Resolve {
        /// SAMLart value as received on the ACS
        #[arg(long, conflicts_with = "query")]
        artifact: Option<String>,

        /// Full ACS query string
        #[arg(long)]
        query: Option<String>,
    },

    /// Print the IdP-initiated SSO URL
    SsoUrl {
        /// Where the IdP should send the user after login
        #[arg(long)]
        target: String,
    },

    /// Print the SP-initiated logout URL
    LogoutUrl {
        /// NameID of the user to log out
        #[arg(long)]
        name_id: String,

        #[arg(long)]
        relay_state: Option<String>,
    },
}

fn load_config(path: Option<&Path>) -> Result<Arc<CorppassConfig>> {
    let path = path.ok_or_else(|| anyhow!("--config (or CORPPASS_CONFIG) is required"))?;
    let config = CorppassConfig::from_file(path)?;
    info!(
        sp_entity = %config.sp_entity,
        idp_entity = %config.idp_entity,
        proxy = config.proxy.is_some(),
        "Loaded service provider configuration"
    );
    Ok(Arc::new(config))
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
}

fn check_payload(file: &Path) -> Result<()> {
    let payload = AuthAccess::new(read_file(file)?);
    let valid = payload.validate();

    let report = json!({
        "valid": valid,
        "errors": payload.errors().iter().map(|e| e.to_string()).collect::<Vec<_>>(),
        "user_id": payload.user_id(),
        "entity_id": payload.entity_id(),
        "entity_status": payload.entity_status(),
        "eservices": payload.eservice_results(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    payload.assert_valid()?;
    Ok(())
}

fn check_response(config: Arc<CorppassConfig>, file: &Path) -> Result<()> {
    let xml = read_file(file)?;
    let response = SamlResponse::from_xml(&xml).map_err(|e| anyhow!(e))?;
    let decryptor = decryptor_from_config(&config)?;
    let validator = ResponseValidator::new(
        response,
        config,
        decryptor.as_ref(),
        Arc::new(TracingNotifier),
    );
    let valid = validator.validate();

    let report = json!({
        "valid": valid,
        "errors": validator.errors().iter().map(|e| e.to_string()).collect::<Vec<_>>(),
        "name_id": validator.name_id(),
        "third_party": validator.is_third_party(),
        "user": validator.user(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    validator.assert_valid()?;
    Ok(())
}

async fn resolve(
    config: Arc<CorppassConfig>,
    artifact: Option<String>,
    query: Option<String>,
) -> Result<()> {
    let request = match (artifact, query) {
        (Some(artifact), _) => ArtifactRequest::new(artifact),
        (None, Some(query)) => ArtifactRequest::from_query(&query)?,
        (None, None) => return Err(anyhow!("either --artifact or --query is required")),
    };

    let resolver = HttpArtifactResolver::new(&config)?;
    let orchestrator = ArtifactOrchestrator::from_config(config, Arc::new(resolver))?;

    match orchestrator.resolve_artifact(&request).await {
        Ok(auth) => {
            let report = json!({
                "user": auth.user,
                "relay_state": auth.relay_state,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            if let Some(raw) = e.raw_document() {
                warn!(kind = e.kind(), raw = %raw, "Resolution failed");
            }
            Err(e.into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("{}={}", env!("CARGO_CRATE_NAME"), log_level))
        .json()
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::CheckPayload { file } => check_payload(&file),
        Command::CheckResponse { file } => {
            check_response(load_config(args.config.as_deref())?, &file)
        }
        Command::Resolve { artifact, query } => {
            resolve(load_config(args.config.as_deref())?, artifact, query).await
        }
        Command::SsoUrl { target } => {
            let provider = ServiceProvider::new(load_config(args.config.as_deref())?)?;
            println!("{}", provider.sso_url(&target)?);
            Ok(())
        }
        Command::LogoutUrl {
            name_id,
            relay_state,
        } => {
            let provider = ServiceProvider::new(load_config(args.config.as_deref())?)?;
            let url = provider
                .logout_request_url(&name_id, relay_state.as_deref())?
                .ok_or_else(|| anyhow!("IdP SLO URL not configured"))?;
            println!("{}", url);
            Ok(())
        }
    }
}
