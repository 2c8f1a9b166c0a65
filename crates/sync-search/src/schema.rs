//! Tantivy schema for synced records.
//!
//! Every destination index shares one schema. The record ID is the upsert
//! key: indexing a record deletes any document with the same ID first.

use tantivy::schema::{Field, Schema, FAST, INDEXED, STORED, STRING, TEXT};

use crate::SearchError;

/// Schema field handles for efficient access
#[derive(Debug, Clone)]
pub struct RecordSchema {
    schema: Schema,
    /// Record ID, upsert key (u64, INDEXED | STORED | FAST)
    pub id: Field,
    /// Owning tenant, 0 for global kinds (u64, INDEXED | STORED)
    pub tenant: Field,
    /// Content kind slug (STRING | STORED)
    pub kind: Field,
    /// Record subtype, empty when unset (STRING | STORED)
    pub subtype: Field,
    /// Title (TEXT | STORED)
    pub title: Field,
    /// Body text (TEXT)
    pub body: Field,
    /// Extra fields as a JSON string (STORED)
    pub fields_json: Field,
    /// Modification time in milliseconds (i64, STORED | FAST)
    pub modified_ms: Field,
}

impl RecordSchema {
    /// Get the underlying Tantivy schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Create a RecordSchema from an existing Tantivy Schema
    pub fn from_schema(schema: Schema) -> Result<Self, SearchError> {
        let field = |name: &str| {
            schema
                .get_field(name)
                .map_err(|_| SearchError::SchemaMismatch(format!("missing {} field", name)))
        };

        Ok(Self {
            id: field("id")?,
            tenant: field("tenant")?,
            kind: field("kind")?,
            subtype: field("subtype")?,
            title: field("title")?,
            body: field("body")?,
            fields_json: field("fields_json")?,
            modified_ms: field("modified_ms")?,
            schema,
        })
    }
}

/// Build the record schema.
pub fn build_record_schema() -> RecordSchema {
    let mut schema_builder = Schema::builder();

    let id = schema_builder.add_u64_field("id", INDEXED | STORED | FAST);
    let tenant = schema_builder.add_u64_field("tenant", INDEXED | STORED);
    let kind = schema_builder.add_text_field("kind", STRING | STORED);
    let subtype = schema_builder.add_text_field("subtype", STRING | STORED);
    let title = schema_builder.add_text_field("title", TEXT | STORED);
    let body = schema_builder.add_text_field("body", TEXT);
    let fields_json = schema_builder.add_text_field("fields_json", STORED);
    let modified_ms = schema_builder.add_i64_field("modified_ms", STORED | FAST);

    let schema = schema_builder.build();

    RecordSchema {
        schema,
        id,
        tenant,
        kind,
        subtype,
        title,
        body,
        fields_json,
        modified_ms,
    }
}
