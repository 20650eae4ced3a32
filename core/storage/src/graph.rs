use anyhow::Result;
use journal_schemas::{
    ContextEntity, EntityId, EntityRelationship, EntityType, RelationshipId, RelationshipView,
    UserId,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::database::{json_error, Database};

pub(crate) const ENTITY_SELECT: &str =
    "SELECT id, user_id, entity_type, name, description, metadata, created_at, updated_at
     FROM context_entities";

pub(crate) const RELATIONSHIP_COLUMNS: &str =
    "id, user_id, source_entity_id, target_entity_id, relationship_type, metadata, created_at, updated_at";

const RELATIONSHIP_VIEW_SELECT: &str =
    "SELECT r.id, r.source_entity_id, s.name, s.entity_type, r.relationship_type,
            r.target_entity_id, t.name, t.entity_type, r.updated_at
     FROM entity_relationships r
     JOIN context_entities s ON s.id = r.source_entity_id
     JOIN context_entities t ON t.id = r.target_entity_id";

impl Database {
    // ========== CONTEXT ENTITIES ==========

    /// Every entity for a user, grouped by type then name
    pub fn list_entities(&self, user_id: &UserId, entity_type: Option<EntityType>) -> Result<Vec<ContextEntity>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE user_id = ?1 AND (?2 IS NULL OR entity_type = ?2)
             ORDER BY entity_type ASC, name ASC",
            ENTITY_SELECT
        ))?;

        let entities = stmt
            .query_map(
                params![user_id.0, entity_type.map(|t| t.as_str())],
                row_to_entity,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entities)
    }

    /// Most recently touched entities first
    pub fn recent_entities(&self, user_id: &UserId, limit: usize) -> Result<Vec<ContextEntity>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE user_id = ?1 ORDER BY updated_at DESC, rowid DESC LIMIT ?2",
            ENTITY_SELECT
        ))?;

        let entities = stmt
            .query_map(params![user_id.0, limit as i64], row_to_entity)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entities)
    }

    pub fn get_entity(&self, user_id: &UserId, id: &EntityId) -> Result<Option<ContextEntity>> {
        let entity = self
            .conn
            .query_row(
                &format!("{} WHERE id = ?1 AND user_id = ?2", ENTITY_SELECT),
                params![id.0, user_id.0],
                row_to_entity,
            )
            .optional()?;

        Ok(entity)
    }

    /// Exact (case-insensitive) identity lookup
    pub fn find_entity(&self, user_id: &UserId, entity_type: EntityType, name: &str) -> Result<Option<ContextEntity>> {
        find_entity(&self.conn, user_id, Some(entity_type), name)
    }

    /// Removes the entity and, through the foreign keys, every edge touching it
    pub fn delete_entity(&self, user_id: &UserId, id: &EntityId) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM context_entities WHERE id = ?1 AND user_id = ?2",
            params![id.0, user_id.0],
        )?;

        if deleted > 0 {
            info!("Deleted entity {} for {}", id, user_id);
        }
        Ok(deleted > 0)
    }

    // ========== ENTITY RELATIONSHIPS ==========

    pub fn list_relationships(&self, user_id: &UserId) -> Result<Vec<RelationshipView>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE r.user_id = ?1 ORDER BY s.name ASC, r.relationship_type ASC, t.name ASC",
            RELATIONSHIP_VIEW_SELECT
        ))?;

        let relationships = stmt
            .query_map(params![user_id.0], row_to_relationship_view)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(relationships)
    }

    /// Most recently touched edges first
    pub fn recent_relationships(&self, user_id: &UserId, limit: usize) -> Result<Vec<RelationshipView>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE r.user_id = ?1 ORDER BY r.updated_at DESC, r.rowid DESC LIMIT ?2",
            RELATIONSHIP_VIEW_SELECT
        ))?;

        let relationships = stmt
            .query_map(params![user_id.0, limit as i64], row_to_relationship_view)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(relationships)
    }

    pub fn count_relationships(&self, user_id: &UserId) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM entity_relationships WHERE user_id = ?1",
            params![user_id.0],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

/// Lookup by name, narrowed by type when one is given. Without a type the
/// most recently updated match wins.
pub(crate) fn find_entity(
    conn: &Connection,
    user_id: &UserId,
    entity_type: Option<EntityType>,
    name: &str,
) -> Result<Option<ContextEntity>> {
    let entity = conn
        .query_row(
            &format!(
                "{} WHERE user_id = ?1 AND name = ?2 AND (?3 IS NULL OR entity_type = ?3)
                 ORDER BY updated_at DESC, rowid DESC LIMIT 1",
                ENTITY_SELECT
            ),
            params![user_id.0, name.trim(), entity_type.map(|t| t.as_str())],
            row_to_entity,
        )
        .optional()?;

    Ok(entity)
}

pub(crate) fn row_to_entity(row: &Row) -> rusqlite::Result<ContextEntity> {
    let metadata_json: String = row.get(5)?;
    let metadata = serde_json::from_str(&metadata_json).map_err(json_error)?;

    Ok(ContextEntity {
        id: EntityId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        entity_type: parse_entity_type_column(row, 2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        metadata,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub(crate) fn row_to_relationship(row: &Row) -> rusqlite::Result<EntityRelationship> {
    let metadata_json: String = row.get(5)?;
    let metadata = serde_json::from_str(&metadata_json).map_err(json_error)?;

    Ok(EntityRelationship {
        id: RelationshipId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        source_entity_id: EntityId(row.get(2)?),
        target_entity_id: EntityId(row.get(3)?),
        relationship_type: row.get(4)?,
        metadata,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn row_to_relationship_view(row: &Row) -> rusqlite::Result<RelationshipView> {
    Ok(RelationshipView {
        id: RelationshipId(row.get(0)?),
        source_entity_id: EntityId(row.get(1)?),
        source_name: row.get(2)?,
        source_type: parse_entity_type_column(row, 3)?,
        relationship_type: row.get(4)?,
        target_entity_id: EntityId(row.get(5)?),
        target_name: row.get(6)?,
        target_type: parse_entity_type_column(row, 7)?,
        updated_at: row.get(8)?,
    })
}

fn parse_entity_type_column(row: &Row, idx: usize) -> rusqlite::Result<EntityType> {
    let raw: String = row.get(idx)?;
    EntityType::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown entity type '{}'", raw).into(),
        )
    })
}
