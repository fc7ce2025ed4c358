//! Configuration-driven endpoint registry.
//!
//! A TOML file lists projects, their networks and each network's endpoints.
//! [`sync_registry`] makes the database match it: rows are looked up by their
//! natural key (project slug, network slug within a project, endpoint URL) and
//! created or updated in place. Endpoints dropped from a listed network are
//! deleted; projects and networks missing from the file are left alone. A sync
//! runs in one transaction and either applies completely or not at all.

use std::collections::HashSet;
use std::{fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::database::Database;
use crate::database::models::{Endpoint, Network, Project};
use crate::monitoring::types::EndpointKind;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to read registry {path}: {err}", path = .0.display(), err = .1)]
    ReadFailed(path::PathBuf, #[source] std::io::Error),
    #[error("failed to parse registry: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("invalid endpoint url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("endpoint url {0:?} is listed more than once")]
    DuplicateUrl(String),
    #[error("database error: {0:#}")]
    Database(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryFile {
    #[serde(default)]
    pub projects: Vec<ProjectEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub networks: Vec<NetworkEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEntry {
    pub slug: String,
    pub name: String,
    pub chain_id: String,
    pub network_type: String,
    #[serde(default)]
    pub endpoints: Vec<EndpointEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

/// What a sync changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub projects_created: usize,
    pub projects_updated: usize,
    pub networks_created: usize,
    pub networks_updated: usize,
    pub endpoints_created: usize,
    pub endpoints_updated: usize,
    pub endpoints_deleted: usize,
}

/// Read a registry file; a missing file yields `None`
pub fn load_registry(path: &path::Path) -> Result<Option<RegistryFile>, SyncError> {
    if !path.exists() {
        warn!("Registry file {} not found, skipping sync", path.display());
        return Ok(None);
    }

    let raw = fs::read_to_string(path).map_err(|err| SyncError::ReadFailed(path.to_path_buf(), err))?;
    Ok(Some(toml::from_str(&raw)?))
}

/// Reject the whole file before touching the database
fn validate(registry: &RegistryFile) -> Result<(), SyncError> {
    let mut seen = HashSet::new();

    for endpoint in registry.projects.iter().flat_map(|p| &p.networks).flat_map(|n| &n.endpoints) {
        let parsed = Url::parse(&endpoint.url)
            .map_err(|err| SyncError::InvalidUrl { url: endpoint.url.clone(), reason: err.to_string() })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SyncError::InvalidUrl {
                url: endpoint.url.clone(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }

        if !seen.insert(endpoint.url.as_str()) {
            return Err(SyncError::DuplicateUrl(endpoint.url.clone()));
        }
    }

    Ok(())
}

/// Bring the database in line with `registry`
pub async fn sync_registry(database: &dyn Database, registry: &RegistryFile) -> Result<SyncReport, SyncError> {
    validate(registry)?;

    if registry.projects.is_empty() {
        info!("No projects in registry");
        return Ok(SyncReport::default());
    }

    let tx = database.begin().await?;
    let applied = apply_registry(tx.as_database(), registry).await;
    let report = match applied {
        Ok(report) => report,
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Failed to roll back registry sync: {rollback_err:#}");
            }
            return Err(err);
        }
    };
    tx.commit().await?;

    info!(
        "Registry sync done: projects +{} ~{}, networks +{} ~{}, endpoints +{} ~{} -{}",
        report.projects_created,
        report.projects_updated,
        report.networks_created,
        report.networks_updated,
        report.endpoints_created,
        report.endpoints_updated,
        report.endpoints_deleted
    );

    Ok(report)
}

async fn apply_registry(database: &dyn Database, registry: &RegistryFile) -> Result<SyncReport, SyncError> {
    let mut report = SyncReport::default();

    let listed_urls: HashSet<&str> = registry
        .projects
        .iter()
        .flat_map(|p| &p.networks)
        .flat_map(|n| &n.endpoints)
        .map(|e| e.url.as_str())
        .collect();

    for project_entry in &registry.projects {
        let project_id = match database.get_project_by_slug(&project_entry.slug).await? {
            None => {
                let id = database
                    .save_project(&Project::new(project_entry.slug.clone(), project_entry.name.clone()))
                    .await?;
                info!("Created project: {}", project_entry.slug);
                report.projects_created += 1;
                id
            }
            Some(mut project) => {
                let id = project.id.ok_or_else(|| anyhow::anyhow!("stored project without id"))?;
                if project.name != project_entry.name {
                    project.name = project_entry.name.clone();
                    database.save_project(&project).await?;
                    info!("Updated project name: {} -> {}", project_entry.slug, project_entry.name);
                    report.projects_updated += 1;
                }
                id
            }
        };

        for network_entry in &project_entry.networks {
            let network_id =
                sync_network(database, project_id, &project_entry.slug, network_entry, &mut report).await?;

            let wanted: HashSet<&str> = network_entry.endpoints.iter().map(|e| e.url.as_str()).collect();

            for endpoint_entry in &network_entry.endpoints {
                sync_endpoint(database, network_id, endpoint_entry, &mut report).await?;
            }

            // Endpoints listed under another network are moved there, not deleted
            for endpoint in database.get_endpoints(network_id, false).await? {
                if wanted.contains(endpoint.url.as_str()) || listed_urls.contains(endpoint.url.as_str()) {
                    continue;
                }
                if let Some(id) = endpoint.id {
                    database.delete_endpoint(id).await?;
                    info!(
                        "Deleted endpoint: {}/{} [{}] {}",
                        project_entry.slug, network_entry.slug, endpoint.kind, endpoint.url
                    );
                    report.endpoints_deleted += 1;
                }
            }
        }
    }

    Ok(report)
}

async fn sync_network(
    database: &dyn Database,
    project_id: i64,
    project_slug: &str,
    entry: &NetworkEntry,
    report: &mut SyncReport,
) -> Result<i64, SyncError> {
    match database.get_network_by_slug(project_id, &entry.slug).await? {
        None => {
            let network = Network::new(
                project_id,
                entry.slug.clone(),
                entry.name.clone(),
                entry.chain_id.clone(),
                entry.network_type.clone(),
            );
            let id = database.save_network(&network).await?;
            info!("Created network: {}/{}", project_slug, entry.slug);
            report.networks_created += 1;
            Ok(id)
        }
        Some(mut network) => {
            let id = network.id.ok_or_else(|| anyhow::anyhow!("stored network without id"))?;
            let changed = network.name != entry.name
                || network.chain_id != entry.chain_id
                || network.network_type != entry.network_type;

            if changed {
                network.name = entry.name.clone();
                network.chain_id = entry.chain_id.clone();
                network.network_type = entry.network_type.clone();
                database.save_network(&network).await?;
                info!("Updated network: {}/{}", project_slug, entry.slug);
                report.networks_updated += 1;
            }
            Ok(id)
        }
    }
}

async fn sync_endpoint(
    database: &dyn Database,
    network_id: i64,
    entry: &EndpointEntry,
    report: &mut SyncReport,
) -> Result<(), SyncError> {
    if EndpointKind::parse(&entry.kind) == EndpointKind::Other {
        warn!("Endpoint {} has unknown type {:?}; it will be probed as an API without chain id check", entry.url, entry.kind);
    }

    match database.get_endpoint_by_url(&entry.url).await? {
        None => {
            let endpoint =
                Endpoint::new(network_id, entry.name.clone(), entry.kind.clone(), entry.url.clone(), entry.enabled);
            database.save_endpoint(&endpoint).await?;
            info!("Created endpoint: [{}] {}", entry.kind, entry.url);
            report.endpoints_created += 1;
        }
        Some(mut endpoint) => {
            let changed = endpoint.network_id != network_id
                || endpoint.name != entry.name
                || endpoint.kind != entry.kind
                || endpoint.enabled != entry.enabled;

            if changed {
                endpoint.network_id = network_id;
                endpoint.name = entry.name.clone();
                endpoint.kind = entry.kind.clone();
                endpoint.enabled = entry.enabled;
                database.save_endpoint(&endpoint).await?;
                info!("Updated endpoint: [{}] {}", entry.kind, entry.url);
                report.endpoints_updated += 1;
            }
        }
    }

    Ok(())
}
