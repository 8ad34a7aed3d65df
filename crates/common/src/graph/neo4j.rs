//! Neo4j HTTP transactional endpoint client

use super::{Community, ConceptNode, GraphClient, Neighbor};
use crate::config::GraphConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

const CONCEPT_CANDIDATES: &str = "MATCH (c:Concept) \
     RETURN c.id AS id, c.name AS name, c.description AS description \
     LIMIT $limit";

const CONCEPT_NEIGHBORS: &str = "MATCH (c:Concept {id: $concept_id})-[r]-(related:Concept) \
     RETURN related.name AS name, type(r) AS rel_type, r.description AS rel_desc \
     LIMIT $limit";

const TOP_COMMUNITIES: &str = "MATCH (c:Community) \
     WHERE c.summary IS NOT NULL \
     RETURN c.id AS id, c.summary AS summary, c.node_count AS node_count \
     ORDER BY c.node_count DESC \
     LIMIT $limit";

#[derive(Serialize)]
struct Statement<'a> {
    statement: &'a str,
    parameters: Value,
}

#[derive(Serialize)]
struct CommitRequest<'a> {
    statements: [Statement<'a>; 1],
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<Neo4jError>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    data: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct Row {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Neo4jError {
    code: String,
    message: String,
}

/// Graph client posting parameterized Cypher to `/db/{database}/tx/commit`
pub struct Neo4jHttpClient {
    client: reqwest::Client,
    endpoint: String,
    user: String,
    password: String,
}

impl Neo4jHttpClient {
    pub fn new(config: &GraphConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/db/{}/tx/commit",
                config.uri.trim_end_matches('/'),
                config.database
            ),
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }

    async fn run(&self, statement: &str, parameters: Value) -> Result<Vec<Vec<Value>>> {
        let request = CommitRequest {
            statements: [Statement {
                statement,
                parameters,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.user, Some(&self.password))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Graph {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Graph {
                message: format!("Neo4j error {}: {}", status, body),
            });
        }

        let commit: CommitResponse =
            response.json().await.map_err(|e| AppError::MalformedResponse {
                message: format!("Failed to parse Neo4j response: {}", e),
            })?;

        rows_of(commit)
    }
}

fn rows_of(commit: CommitResponse) -> Result<Vec<Vec<Value>>> {
    if let Some(error) = commit.errors.first() {
        return Err(AppError::Graph {
            message: format!("{}: {}", error.code, error.message),
        });
    }

    Ok(commit
        .results
        .into_iter()
        .next()
        .map(|r| r.data.into_iter().map(|d| d.row).collect())
        .unwrap_or_default())
}

fn string_at(row: &[Value], idx: usize) -> Option<String> {
    match row.get(idx)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn concept_from_row(row: &[Value]) -> Result<ConceptNode> {
    let id = string_at(row, 0).ok_or_else(|| AppError::MalformedResponse {
        message: "Concept row without id".to_string(),
    })?;
    Ok(ConceptNode {
        id,
        name: string_at(row, 1).unwrap_or_default(),
        description: string_at(row, 2).unwrap_or_default(),
    })
}

fn neighbor_from_row(row: &[Value]) -> Neighbor {
    Neighbor {
        name: string_at(row, 0).unwrap_or_default(),
        relationship_type: string_at(row, 1).unwrap_or_default(),
        relationship_description: string_at(row, 2),
    }
}

fn community_from_row(row: &[Value]) -> Result<Community> {
    let id = string_at(row, 0).ok_or_else(|| AppError::MalformedResponse {
        message: "Community row without id".to_string(),
    })?;
    Ok(Community {
        id,
        summary: string_at(row, 1).unwrap_or_default(),
        member_count: row.get(2).and_then(Value::as_u64).unwrap_or(0),
    })
}

#[async_trait]
impl GraphClient for Neo4jHttpClient {
    async fn concept_candidates(&self, limit: usize) -> Result<Vec<ConceptNode>> {
        let rows = self.run(CONCEPT_CANDIDATES, json!({ "limit": limit })).await?;
        rows.iter().map(|r| concept_from_row(r)).collect()
    }

    async fn concept_neighbors(&self, concept_id: &str, limit: usize) -> Result<Vec<Neighbor>> {
        let rows = self
            .run(
                CONCEPT_NEIGHBORS,
                json!({ "concept_id": concept_id, "limit": limit }),
            )
            .await?;
        Ok(rows.iter().map(|r| neighbor_from_row(r)).collect())
    }

    async fn top_communities(&self, limit: usize) -> Result<Vec<Community>> {
        let rows = self.run(TOP_COMMUNITIES, json!({ "limit": limit })).await?;
        rows.iter().map(|r| community_from_row(r)).collect()
    }
}
