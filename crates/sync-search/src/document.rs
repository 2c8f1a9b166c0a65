//! Document mapping from stored records to Tantivy documents.

use tantivy::doc;
use tantivy::TantivyDocument;

use sync_types::StoredRecord;

use crate::error::SearchError;
use crate::schema::RecordSchema;

/// Convert a record to a Tantivy document.
///
/// Global records carry tenant 0. Extra fields are stored as one JSON string.
pub fn record_to_doc(
    schema: &RecordSchema,
    record: &StoredRecord,
) -> Result<TantivyDocument, SearchError> {
    let fields_json = serde_json::to_string(&record.fields)?;

    Ok(doc!(
        schema.id => record.id,
        schema.tenant => record.tenant.map(|t| t.0).unwrap_or(0),
        schema.kind => record.kind.as_str(),
        schema.subtype => record.subtype.clone().unwrap_or_default(),
        schema.title => record.title.clone(),
        schema.body => record.body.clone(),
        schema.fields_json => fields_json,
        schema.modified_ms => record.modified_at.timestamp_millis()
    ))
}
