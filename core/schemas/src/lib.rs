use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ULID and ID Types
// ============================================================================

/// Opaque identifier of the account that owns a row. Every read and write is
/// scoped by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriorityId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuestionId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PriorityId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Journal Schema
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: EntryId,
    pub content: String,
    pub date: NaiveDate,
    pub user_id: UserId,
    pub created_at: String, // RFC3339
    pub updated_at: String, // RFC3339
}

/// Largest rank a priority may carry
pub const MAX_PRIORITY_RANK: u32 = i32::MAX as u32;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Priority {
    pub id: PriorityId,
    pub content: String,
    /// Manual ordering, lower ranks first. Ties are allowed.
    pub rank: u32,
    pub completed: bool,
    pub date: NaiveDate,
    pub journal_entry_id: Option<EntryId>,
    pub user_id: UserId,
    pub created_at: String, // RFC3339
    pub updated_at: String, // RFC3339
}

// ============================================================================
// Context Graph Schema
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    #[serde(rename = "person")]
    Person,
    #[serde(rename = "role")]
    Role,
    #[serde(rename = "project")]
    Project,
    #[serde(rename = "product")]
    Product,
    #[serde(rename = "strategy")]
    Strategy,
}

impl EntityType {
    pub const ALL: [EntityType; 5] = [
        EntityType::Person,
        EntityType::Role,
        EntityType::Project,
        EntityType::Product,
        EntityType::Strategy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Role => "role",
            EntityType::Project => "project",
            EntityType::Product => "product",
            EntityType::Strategy => "strategy",
        }
    }

    /// Lenient parse used for model output and query strings.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "person" | "people" => Some(EntityType::Person),
            "role" => Some(EntityType::Role),
            "project" => Some(EntityType::Project),
            "product" => Some(EntityType::Product),
            "strategy" => Some(EntityType::Strategy),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextEntity {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub name: String,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
    pub user_id: UserId,
    pub created_at: String, // RFC3339
    pub updated_at: String, // RFC3339
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRelationship {
    pub id: RelationshipId,
    pub source_entity_id: EntityId,
    pub target_entity_id: EntityId,
    pub relationship_type: String,
    pub metadata: serde_json::Value,
    pub user_id: UserId,
    pub created_at: String, // RFC3339
    pub updated_at: String, // RFC3339
}

/// A relationship joined with the names and types of both endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipView {
    pub id: RelationshipId,
    pub source_entity_id: EntityId,
    pub source_name: String,
    pub source_type: EntityType,
    pub relationship_type: String,
    pub target_entity_id: EntityId,
    pub target_name: String,
    pub target_type: EntityType,
    pub updated_at: String, // RFC3339
}

// ============================================================================
// Clarifying Questions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "answered")]
    Answered,
    #[serde(rename = "dismissed")]
    Dismissed,
}

impl QuestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionStatus::Pending => "pending",
            QuestionStatus::Answered => "answered",
            QuestionStatus::Dismissed => "dismissed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "pending" => Some(QuestionStatus::Pending),
            "answered" => Some(QuestionStatus::Answered),
            "dismissed" => Some(QuestionStatus::Dismissed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClarifyingQuestion {
    pub id: QuestionId,
    pub question: String,
    pub answer: Option<String>,
    pub status: QuestionStatus,
    pub user_id: UserId,
    pub created_at: String, // RFC3339
    pub updated_at: String, // RFC3339
}

// ============================================================================
// API Request/Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntryRequest {
    pub content: String,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntryRequest {
    pub content: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPage {
    pub entries: Vec<JournalEntry>,
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePriorityRequest {
    pub content: String,
    pub rank: Option<u32>,
    pub date: Option<NaiveDate>,
    pub journal_entry_id: Option<EntryId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePriorityRequest {
    pub content: Option<String>,
    pub rank: Option<u32>,
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankRequest {
    pub rank: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub answer: String,
}

/// Outcome counts for entity upserts in one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityCounts {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Outcome counts for relationship inserts in one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipCounts {
    pub created: usize,
    pub existing: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryAnalysisResponse {
    pub entry_id: EntryId,
    pub priorities: Vec<Priority>,
    pub entities: EntityCounts,
    pub relationships: RelationshipCounts,
    pub questions: Vec<ClarifyingQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummaryResponse {
    pub date: NaiveDate,
    pub summary: Option<String>,
    /// All priorities for the date after the pass, newly created ones included.
    pub priorities: Vec<Priority>,
    pub created: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResponse {
    pub question: ClarifyingQuestion,
    pub entities: EntityCounts,
    pub relationships: RelationshipCounts,
}

// ============================================================================
// Helper Functions
// ============================================================================

pub fn generate_entry_id() -> EntryId {
    EntryId(format!("entry_{}", ulid::Ulid::new()))
}

pub fn generate_priority_id() -> PriorityId {
    PriorityId(format!("pri_{}", ulid::Ulid::new()))
}

pub fn generate_entity_id() -> EntityId {
    EntityId(format!("ent_{}", ulid::Ulid::new()))
}

pub fn generate_relationship_id() -> RelationshipId {
    RelationshipId(format!("rel_{}", ulid::Ulid::new()))
}

pub fn generate_question_id() -> QuestionId {
    QuestionId(format!("q_{}", ulid::Ulid::new()))
}

/// Canonical spelling for relationship types: trimmed, lowercase, spaces and
/// dashes folded to underscores ("Works On" -> "works_on").
pub fn normalize_relationship_type(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_generation() {
        let entry_id = generate_entry_id();
        assert!(entry_id.0.starts_with("entry_"));
        assert_eq!(entry_id.0.len(), 32); // "entry_" + 26 chars

        assert!(generate_priority_id().0.starts_with("pri_"));
        assert!(generate_entity_id().0.starts_with("ent_"));
        assert!(generate_relationship_id().0.starts_with("rel_"));
        assert!(generate_question_id().0.starts_with("q_"));
    }

    #[test]
    fn test_entity_type_parse() {
        assert_eq!(EntityType::parse("Person"), Some(EntityType::Person));
        assert_eq!(EntityType::parse(" project "), Some(EntityType::Project));
        assert_eq!(EntityType::parse("team"), None);
        for kind in EntityType::ALL {
            assert_eq!(EntityType::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_relationship_type_normalization() {
        assert_eq!(normalize_relationship_type("Works On"), "works_on");
        assert_eq!(normalize_relationship_type("depends-on"), "depends_on");
        assert_eq!(normalize_relationship_type("  manages "), "manages");
    }

    #[test]
    fn test_entity_wire_format() {
        let entity = ContextEntity {
            id: generate_entity_id(),
            entity_type: EntityType::Project,
            name: "Atlas".to_string(),
            description: Some("Launch program".to_string()),
            metadata: serde_json::json!({}),
            user_id: UserId("user-1".to_string()),
            created_at: "2025-11-02T18:00:00Z".to_string(),
            updated_at: "2025-11-02T18:00:00Z".to_string(),
        };

        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["type"], "project");
        assert_eq!(json["userId"], "user-1");
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_create_entry_request_date_format() {
        let request: CreateEntryRequest =
            serde_json::from_str(r#"{"content":"Hello","date":"2025-03-14"}"#).unwrap();
        assert_eq!(request.date, NaiveDate::from_ymd_opt(2025, 3, 14));

        let bad = serde_json::from_str::<CreateEntryRequest>(r#"{"content":"x","date":"14/03/2025"}"#);
        assert!(bad.is_err());
    }
}
