use actix_web::{HttpResponse, get, web};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use chainwatch_service::database::Database;
use chainwatch_service::database::models::{Endpoint, EndpointStatus, Network, Project};

use crate::error::ApiError;

macros_utils::routes! {
    route list_projects,
    route list_networks,
    route list_endpoints,
    route network_summary,
    route overview,
}

type Db = web::Data<dyn Database>;

/// Human readable block delay, empty when unknown
pub fn format_delay(delay_ms: Option<u64>) -> String {
    let Some(ms) = delay_ms else {
        return String::new();
    };

    if ms < 1_000 {
        return format!("{ms} ms");
    }
    let seconds = ms / 1_000;
    if seconds < 60 {
        return format!("{seconds} s");
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{}m {}s", minutes, seconds % 60);
    }
    format!("{}h {}m", minutes / 60, minutes % 60)
}

#[derive(Debug, Serialize)]
struct ProjectOut {
    slug: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct NetworkOut {
    network_type: String,
    chain_id: String,
}

#[derive(Debug, Serialize)]
struct EndpointOut {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    url: String,
    enabled: bool,
    network_type: String,
}

#[derive(Debug, Serialize)]
struct EndpointSummary {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    url: String,
    enabled: bool,
    is_available: Option<bool>,
    status_code: Option<u16>,
    block_delay_ms: Option<u64>,
    block_delay_human: String,
    last_block_height: Option<String>,
    error_message: Option<String>,
    checked_at: Option<String>,
}

impl EndpointSummary {
    fn new(endpoint: Endpoint, status: Option<EndpointStatus>) -> Self {
        let status = status.as_ref();
        let block_delay_ms = status.and_then(|s| s.block_delay_ms);

        Self {
            name: endpoint.name,
            kind: endpoint.kind,
            url: endpoint.url,
            enabled: endpoint.enabled,
            is_available: status.map(|s| s.is_available),
            status_code: status.and_then(|s| s.status_code),
            block_delay_ms,
            block_delay_human: format_delay(block_delay_ms),
            last_block_height: status.and_then(|s| s.last_block_height.clone()),
            error_message: status.and_then(|s| s.error_message.clone()),
            checked_at: status.map(|s| s.checked_at.to_rfc3339_opts(SecondsFormat::Millis, false)),
        }
    }
}

#[derive(Debug, Serialize)]
struct NetworkSummary {
    chain_id: String,
    network_type: String,
    endpoints: Vec<EndpointSummary>,
}

#[derive(Debug, Serialize)]
struct Summary {
    project: String,
    network_type: String,
    networks: Vec<NetworkSummary>,
}

/// One flat row per endpoint (or per endpoint-less network)
#[derive(Debug, Serialize)]
struct OverviewRow {
    project_slug: String,
    network_type: String,
    chain_id: String,
    #[serde(flatten)]
    endpoint: Option<EndpointSummary>,
}

#[derive(Debug, Deserialize)]
struct EndpointsQuery {
    #[serde(default)]
    only_enabled: bool,
}

#[derive(Debug, Deserialize)]
struct SummaryQuery {
    max_delay: Option<u64>,
}

async fn project_by_slug(database: &Db, slug: &str) -> Result<Project, ApiError> {
    database.get_project_by_slug(slug).await?.ok_or(ApiError::NotFound("Project not found"))
}

async fn networks_of_type(database: &Db, project: &Project, network_type: &str) -> Result<Vec<Network>, ApiError> {
    let project_id = project.id.ok_or_else(|| anyhow::anyhow!("stored project without id"))?;
    let networks = database.get_networks(project_id, Some(network_type)).await?;

    if networks.is_empty() {
        return Err(ApiError::NotFound("No networks with this type"));
    }
    Ok(networks)
}

async fn endpoint_summaries(database: &Db, network: &Network) -> Result<Vec<EndpointSummary>, ApiError> {
    let network_id = network.id.ok_or_else(|| anyhow::anyhow!("stored network without id"))?;

    let mut summaries = Vec::new();
    for endpoint in database.get_endpoints(network_id, false).await? {
        let status = match endpoint.id {
            Some(id) => database.get_endpoint_status(id).await?,
            None => None,
        };
        summaries.push(EndpointSummary::new(endpoint, status));
    }

    Ok(summaries)
}

/// All projects ordered by slug
#[get("/api/projects")]
pub async fn list_projects(database: Db) -> Result<HttpResponse, ApiError> {
    let projects: Vec<ProjectOut> = database
        .list_projects()
        .await?
        .into_iter()
        .map(|p| ProjectOut { slug: p.slug, name: p.name })
        .collect();

    Ok(HttpResponse::Ok().json(projects))
}

/// Networks of a project ordered by network type then chain id
#[get("/api/projects/{project}/networks")]
pub async fn list_networks(database: Db, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let project = project_by_slug(&database, &path).await?;
    let project_id = project.id.ok_or_else(|| anyhow::anyhow!("stored project without id"))?;

    let networks: Vec<NetworkOut> = database
        .get_networks(project_id, None)
        .await?
        .into_iter()
        .map(|n| NetworkOut { network_type: n.network_type, chain_id: n.chain_id })
        .collect();

    Ok(HttpResponse::Ok().json(networks))
}

/// Endpoints of every network of the given type
#[get("/api/projects/{project}/{network_type}/endpoints")]
pub async fn list_endpoints(
    database: Db,
    path: web::Path<(String, String)>,
    query: web::Query<EndpointsQuery>,
) -> Result<HttpResponse, ApiError> {
    let (project_slug, network_type) = path.into_inner();
    let project = project_by_slug(&database, &project_slug).await?;

    let mut endpoints = Vec::new();
    for network in networks_of_type(&database, &project, &network_type).await? {
        let network_id = network.id.ok_or_else(|| anyhow::anyhow!("stored network without id"))?;
        endpoints.extend(database.get_endpoints(network_id, query.only_enabled).await?);
    }
    endpoints.sort_by(|a, b| (&a.kind, &a.name).cmp(&(&b.kind, &b.name)));

    let endpoints: Vec<EndpointOut> = endpoints
        .into_iter()
        .map(|e| EndpointOut {
            name: e.name,
            kind: e.kind,
            url: e.url,
            enabled: e.enabled,
            network_type: network_type.clone(),
        })
        .collect();

    Ok(HttpResponse::Ok().json(endpoints))
}

/// Networks of the given type with each endpoint's latest status.
///
/// `max_delay` (ms) drops endpoints lagging further behind; unknown delays are kept.
#[get("/api/projects/{project}/{network_type}/summary")]
pub async fn network_summary(
    database: Db,
    path: web::Path<(String, String)>,
    query: web::Query<SummaryQuery>,
) -> Result<HttpResponse, ApiError> {
    let (project_slug, network_type) = path.into_inner();
    let project = project_by_slug(&database, &project_slug).await?;

    let mut networks = Vec::new();
    for network in networks_of_type(&database, &project, &network_type).await? {
        let mut endpoints = endpoint_summaries(&database, &network).await?;

        if let Some(max_delay) = query.max_delay {
            endpoints.retain(|e| e.block_delay_ms.is_none_or(|delay| delay <= max_delay));
        }

        networks.push(NetworkSummary { chain_id: network.chain_id, network_type: network.network_type, endpoints });
    }

    Ok(HttpResponse::Ok().json(Summary { project: project.slug, network_type, networks }))
}

/// Every endpoint of every project as flat rows
#[get("/api/overview")]
pub async fn overview(database: Db) -> Result<HttpResponse, ApiError> {
    let mut rows = Vec::new();

    for project in database.list_projects().await? {
        let project_id = project.id.ok_or_else(|| anyhow::anyhow!("stored project without id"))?;

        for network in database.get_networks(project_id, None).await? {
            let endpoints = endpoint_summaries(&database, &network).await?;

            if endpoints.is_empty() {
                rows.push(OverviewRow {
                    project_slug: project.slug.clone(),
                    network_type: network.network_type.clone(),
                    chain_id: network.chain_id.clone(),
                    endpoint: None,
                });
            }
            for endpoint in endpoints {
                rows.push(OverviewRow {
                    project_slug: project.slug.clone(),
                    network_type: network.network_type.clone(),
                    chain_id: network.chain_id.clone(),
                    endpoint: Some(endpoint),
                });
            }
        }
    }

    Ok(HttpResponse::Ok().json(rows))
}
