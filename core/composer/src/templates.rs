use journal_schemas::{ClarifyingQuestion, ContextEntity, JournalEntry, RelationshipView};

use crate::composer::AnalysisContext;

/// Low temperature keeps extraction repeatable across runs
pub const EXTRACTION_TEMPERATURE: f32 = 0.2;

/// Context entries longer than this are cut so one long entry cannot crowd out the rest
const CONTEXT_ENTRY_CHARS: usize = 600;

/// A rendered request for the chat model
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub temperature: f32,
}

const SYSTEM_ANALYST: &str = "You are a thoughtful assistant that reads a person's work journal \
and maintains a model of the people, roles, projects, products and strategies in their life. \
Always respond with a single valid JSON object and nothing else.";

const ENTITY_CONTRACT: &str = r#"    {
      "type": "person|role|project|product|strategy",
      "name": "canonical name",
      "description": "one sentence about this entity"
    }"#;

const RELATIONSHIP_CONTRACT: &str = r#"    {
      "sourceType": "person|role|project|product|strategy",
      "sourceName": "name of the source entity",
      "relationshipType": "snake_case verb such as works_on, manages, depends_on",
      "targetType": "person|role|project|product|strategy",
      "targetName": "name of the target entity"
    }"#;

/// Renders the four prompt variants
pub struct PromptTemplates;

impl PromptTemplates {
    pub fn new() -> Self {
        Self
    }

    /// New entry -> priorities, entities, relationships and clarifying questions
    pub fn entry_analysis(&self, entry: &JournalEntry, context: &AnalysisContext) -> Prompt {
        let mut lines = vec![
            "Analyze the journal entry below and extract:".to_string(),
            "1. PRIORITIES - concrete action items, ranked (1 = most important)".to_string(),
            "2. ENTITIES - people, roles, projects, products and strategies mentioned".to_string(),
            "3. RELATIONSHIPS - directed links between those entities".to_string(),
            "4. CLARIFYING QUESTIONS - short questions that would fill gaps in what you know"
                .to_string(),
            String::new(),
            format!("Journal entry ({}):", entry.date),
            entry.content.trim().to_string(),
        ];

        push_context_sections(&mut lines, context);

        lines.push(String::new());
        lines.push("Return a JSON object with this structure:".to_string());
        lines.push(format!(
            r#"{{
  "priorities": [
    {{ "content": "short imperative action", "rank": 1 }}
  ],
  "entities": [
{}
  ],
  "relationships": [
{}
  ],
  "clarifyingQuestions": ["question text"]
}}"#,
            ENTITY_CONTRACT, RELATIONSHIP_CONTRACT
        ));
        lines.push(String::new());
        lines.push(
            "Reuse the exact names of known entities when the entry refers to them. \
             Only relate entities that appear in your entities list or in the known entities. \
             Do not repeat questions that were already answered."
                .to_string(),
        );

        self.prompt(lines)
    }

    /// One day's entries -> prose summary plus priorities
    pub fn daily_summary(
        &self,
        date: chrono::NaiveDate,
        entries: &[JournalEntry],
        existing_priorities: &[String],
        context: &AnalysisContext,
    ) -> Prompt {
        let mut lines = vec![
            format!("Summarize the journal entries written on {}.", date),
            "Write a short summary of the day and list the priorities that follow from it."
                .to_string(),
            String::new(),
            "Entries:".to_string(),
        ];

        for (i, entry) in entries.iter().enumerate() {
            lines.push(format!("Entry {}: {}", i + 1, entry.content.trim()));
        }

        if !existing_priorities.is_empty() {
            lines.push(String::new());
            lines.push("Priorities already recorded for this day (do not repeat them):".to_string());
            for content in existing_priorities {
                lines.push(format!("- {}", content));
            }
        }

        push_context_sections(&mut lines, context);

        lines.push(String::new());
        lines.push("Return a JSON object with this structure:".to_string());
        lines.push(
            r#"{
  "summary": "two to four sentences",
  "priorities": [
    { "content": "short imperative action", "rank": 1 }
  ]
}"#
            .to_string(),
        );

        self.prompt(lines)
    }

    /// Known graph -> questions that would fill its gaps
    pub fn question_generation(&self, context: &AnalysisContext) -> Prompt {
        let mut lines = vec![
            "Review what is known about this person's work context and ask up to 3 clarifying \
             questions. Good questions resolve who owns what, how entities relate, or what a \
             vaguely described project or strategy is about."
                .to_string(),
        ];

        push_context_sections(&mut lines, context);

        lines.push(String::new());
        lines.push("Return a JSON object with this structure:".to_string());
        lines.push(
            r#"{
  "questions": ["question text"]
}"#
            .to_string(),
        );
        lines.push(String::new());
        lines.push("Never ask a question that has already been answered.".to_string());

        self.prompt(lines)
    }

    /// Answered question -> new or corrected entities and relationships
    pub fn answer_interpretation(
        &self,
        question: &ClarifyingQuestion,
        answer: &str,
        context: &AnalysisContext,
    ) -> Prompt {
        let mut lines = vec![
            "The user answered one of your clarifying questions. Fold the answer into the \
             context graph: add entities it introduces, refine descriptions it corrects, and \
             add the relationships it states."
                .to_string(),
            String::new(),
            format!("Question: {}", question.question.trim()),
            format!("Answer: {}", answer.trim()),
        ];

        push_context_sections(&mut lines, context);

        lines.push(String::new());
        lines.push("Return a JSON object with this structure:".to_string());
        lines.push(format!(
            r#"{{
  "entities": [
{}
  ],
  "relationships": [
{}
  ]
}}"#,
            ENTITY_CONTRACT, RELATIONSHIP_CONTRACT
        ));
        lines.push(String::new());
        lines.push(
            "Only include entities whose description is new or changed. Use the exact names of \
             known entities."
                .to_string(),
        );

        self.prompt(lines)
    }

    fn prompt(&self, lines: Vec<String>) -> Prompt {
        Prompt {
            system: SYSTEM_ANALYST.to_string(),
            user: lines.join("\n"),
            temperature: EXTRACTION_TEMPERATURE,
        }
    }
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self::new()
    }
}

fn push_context_sections(lines: &mut Vec<String>, context: &AnalysisContext) {
    if !context.recent_entries.is_empty() {
        lines.push(String::new());
        lines.push("Recent journal entries (for context):".to_string());
        for entry in &context.recent_entries {
            lines.push(render_entry(entry));
        }
    }

    if !context.entities.is_empty() {
        lines.push(String::new());
        lines.push("Known entities:".to_string());
        for entity in &context.entities {
            lines.push(render_entity(entity));
        }
    }

    if !context.relationships.is_empty() {
        lines.push(String::new());
        lines.push("Known relationships:".to_string());
        for relationship in &context.relationships {
            lines.push(render_relationship(relationship));
        }
    }

    if !context.answered_questions.is_empty() {
        lines.push(String::new());
        lines.push("Previously answered questions:".to_string());
        for question in &context.answered_questions {
            lines.push(format!("Q: {}", question.question));
            lines.push(format!("A: {}", question.answer.as_deref().unwrap_or("")));
        }
    }
}

fn render_entry(entry: &JournalEntry) -> String {
    let content = entry.content.trim();
    let mut text: String = content.chars().take(CONTEXT_ENTRY_CHARS).collect();
    if content.chars().count() > CONTEXT_ENTRY_CHARS {
        text.push('…');
    }
    format!("- [{}] {}", entry.date, text)
}

fn render_entity(entity: &ContextEntity) -> String {
    match entity.description.as_deref() {
        Some(description) => format!("- {} ({}): {}", entity.name, entity.entity_type, description),
        None => format!("- {} ({})", entity.name, entity.entity_type),
    }
}

fn render_relationship(relationship: &RelationshipView) -> String {
    format!(
        "- {} ({}) --{}--> {} ({})",
        relationship.source_name,
        relationship.source_type,
        relationship.relationship_type,
        relationship.target_name,
        relationship.target_type
    )
}
