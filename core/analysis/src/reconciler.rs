use anyhow::Result;
use chrono::NaiveDate;
use journal_schemas::{
    normalize_relationship_type, ClarifyingQuestion, ContextEntity, EntityCounts, EntityType,
    EntryId, Priority, RelationshipCounts, MAX_PRIORITY_RANK,
};
use journal_storage::{normalize_content, NewPriority, UpsertOutcome, WriteBatch};
use tracing::{debug, warn};

use crate::response::{ExtractedEntity, ExtractedPriority, ExtractedRelationship, QuestionItem};

/// Insert extracted priorities for `date`. Items without a positive rank take
/// their 1-based position. With `skip_existing`, items whose normalised content
/// is already filed for the day (or earlier in the same list) are skipped.
pub fn apply_priorities(
    batch: &WriteBatch,
    items: &[ExtractedPriority],
    date: NaiveDate,
    journal_entry_id: Option<&EntryId>,
    skip_existing: bool,
) -> Result<Vec<Priority>> {
    let mut seen = if skip_existing {
        batch.priority_contents_for_date(date)?
    } else {
        Default::default()
    };

    let mut created = Vec::with_capacity(items.len());

    for (position, item) in items.iter().enumerate() {
        let content = item.content.trim();
        if content.is_empty() {
            warn!("Skipping priority with empty content at position {}", position + 1);
            continue;
        }

        if skip_existing && !seen.insert(normalize_content(content)) {
            debug!("Priority '{}' already filed for {}", content, date);
            continue;
        }

        let rank = match item.rank {
            Some(rank) if rank > 0 => u32::try_from(rank)
                .map_or(MAX_PRIORITY_RANK, |rank| rank.min(MAX_PRIORITY_RANK)),
            _ => position as u32 + 1,
        };

        created.push(batch.insert_priority(&NewPriority {
            content,
            rank,
            date,
            journal_entry_id,
        })?);
    }

    Ok(created)
}

/// Upsert entities, then link relationships between them. Endpoints resolve
/// against this batch first and the stored graph second.
pub fn apply_graph(
    batch: &WriteBatch,
    entities: &[ExtractedEntity],
    relationships: &[ExtractedRelationship],
) -> Result<(EntityCounts, RelationshipCounts)> {
    let mut entity_counts = EntityCounts::default();
    let mut touched: Vec<ContextEntity> = Vec::with_capacity(entities.len());

    for extracted in entities {
        let name = extracted.name.trim();
        let Some(entity_type) = EntityType::parse(&extracted.entity_type) else {
            warn!("Unknown entity type '{}' for '{}', skipping", extracted.entity_type, name);
            continue;
        };
        if name.is_empty() {
            warn!("Skipping {} entity with empty name", entity_type);
            continue;
        }

        let (entity, outcome) =
            batch.upsert_entity(entity_type, name, extracted.description.as_deref())?;

        match outcome {
            UpsertOutcome::Created => entity_counts.created += 1,
            UpsertOutcome::Updated => entity_counts.updated += 1,
            UpsertOutcome::Unchanged => entity_counts.unchanged += 1,
        }
        touched.push(entity);
    }

    let mut relationship_counts = RelationshipCounts::default();

    for extracted in relationships {
        let relationship_type = normalize_relationship_type(&extracted.relationship_type);

        let source = resolve_endpoint(
            batch,
            &touched,
            extracted.source_name.as_deref(),
            extracted.source_type.as_deref(),
        )?;
        let target = resolve_endpoint(
            batch,
            &touched,
            extracted.target_name.as_deref(),
            extracted.target_type.as_deref(),
        )?;

        let (source, target) = match (source, target) {
            (Some(source), Some(target)) if !relationship_type.is_empty() => (source, target),
            _ => {
                warn!(
                    "Dropping relationship {:?} -{}-> {:?}: endpoint or type unresolved",
                    extracted.source_name, extracted.relationship_type, extracted.target_name
                );
                relationship_counts.dropped += 1;
                continue;
            }
        };

        if source.id == target.id {
            warn!("Dropping self-relationship on '{}'", source.name);
            relationship_counts.dropped += 1;
            continue;
        }

        if batch
            .insert_relationship(&source.id, &target.id, &relationship_type)?
            .is_some()
        {
            relationship_counts.created += 1;
        } else {
            relationship_counts.existing += 1;
        }
    }

    debug!(
        "Graph pass: entities {:?}, relationships {:?}",
        entity_counts, relationship_counts
    );
    Ok((entity_counts, relationship_counts))
}

/// Store proposed questions as pending; texts the user was already asked are skipped
pub fn apply_questions(batch: &WriteBatch, items: &[QuestionItem]) -> Result<Vec<ClarifyingQuestion>> {
    let mut created = Vec::new();

    for item in items {
        let text = item.text().trim();
        if text.is_empty() {
            continue;
        }

        match batch.insert_question(text)? {
            Some(question) => created.push(question),
            None => debug!("Question already asked: {}", text),
        }
    }

    Ok(created)
}

/// A supplied type must parse and match; an unknown type never resolves
fn resolve_endpoint(
    batch: &WriteBatch,
    touched: &[ContextEntity],
    name: Option<&str>,
    entity_type: Option<&str>,
) -> Result<Option<ContextEntity>> {
    let name = match name.map(str::trim) {
        Some(name) if !name.is_empty() => name,
        _ => return Ok(None),
    };

    let entity_type = match entity_type.map(str::trim).filter(|t| !t.is_empty()) {
        Some(raw) => match EntityType::parse(raw) {
            Some(parsed) => Some(parsed),
            None => return Ok(None),
        },
        None => None,
    };

    let in_batch = touched.iter().find(|entity| {
        entity.name.eq_ignore_ascii_case(name)
            && entity_type.map_or(true, |t| t == entity.entity_type)
    });

    if let Some(entity) = in_batch {
        return Ok(Some(entity.clone()));
    }

    batch.find_entity(entity_type, name)
}
