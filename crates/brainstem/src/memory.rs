//! Collaborator contracts for the graph memory store and the entity
//! extractor. Both are external to the core; the brainstem only pins the
//! surface its loops consume.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use axon_domain::Result;

/// The graph memory store surface.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Record a conversation node; returns its id.
    async fn create_conversation(&self, session_id: &str, summary: &str) -> Result<String>;

    /// Record an entity node; returns its id.
    async fn create_entity(&self, name: &str, kind: &str, properties: Value) -> Result<String>;

    /// Record a relationship between two nodes.
    async fn create_relationship(&self, from_id: &str, to_id: &str, kind: &str) -> Result<()>;

    /// Run a read query; rows are backend-shaped JSON objects.
    async fn query_memory(&self, query: &str) -> Result<Vec<Value>>;

    /// Ranked user interests derived from the graph.
    async fn get_user_interests(&self) -> Result<Vec<String>>;
}

/// One extracted entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// One extracted relationship (by entity name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedRelationship {
    pub from: String,
    pub to: String,
    pub kind: String,
}

/// Result of running extraction over conversation pairs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub relationships: Vec<ExtractedRelationship>,
}

/// The entity-extraction collaborator (typically an external API model).
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    /// Extract entities/relationships from (user, assistant) turn pairs.
    async fn extract(&self, pairs: &[(String, String)]) -> Result<Extraction>;
}
