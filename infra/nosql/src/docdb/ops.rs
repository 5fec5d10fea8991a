//! Update operators and the audit-aware update documents built from them.

use bson::{Bson, DateTime, Document};

pub const OP_CURRENT_DATE: &str = "$currentDate";
pub const OP_INC: &str = "$inc";
pub const OP_MIN: &str = "$min";
pub const OP_MAX: &str = "$max";
pub const OP_MUL: &str = "$mul";
pub const OP_RENAME: &str = "$rename";
pub const OP_SET: &str = "$set";
pub const OP_SET_ON_INSERT: &str = "$setOnInsert";
pub const OP_UNSET: &str = "$unset";
pub const OP_ADD_TO_SET: &str = "$addToSet";
pub const OP_POP: &str = "$pop";
pub const OP_PULL: &str = "$pull";
pub const OP_PULL_ALL: &str = "$pullAll";
pub const OP_PUSH: &str = "$push";
pub const OP_BIT: &str = "$bit";
pub const OP_AND: &str = "$and";
pub const OP_OR: &str = "$or";
pub const OP_XOR: &str = "$xor";
pub const OP_NOT: &str = "$not";

/// Every operator that marks a document as an update rather than a replacement.
pub const DOC_UPDATE_OPS: [&str; 19] = [
    OP_CURRENT_DATE,
    OP_INC,
    OP_MIN,
    OP_MAX,
    OP_MUL,
    OP_RENAME,
    OP_SET,
    OP_SET_ON_INSERT,
    OP_UNSET,
    OP_ADD_TO_SET,
    OP_POP,
    OP_PULL,
    OP_PULL_ALL,
    OP_PUSH,
    OP_BIT,
    OP_AND,
    OP_OR,
    OP_XOR,
    OP_NOT,
];

pub const FIELD_ID: &str = "_id";
pub const FIELD_CREATED_AT: &str = "created_at";
pub const FIELD_UPDATED_AT: &str = "updated_at";
pub const FIELD_CREATED_BY: &str = "created_by";
pub const FIELD_UPDATED_BY: &str = "updated_by";

/// Whether `data` uses at least one update operator at the top level.
#[must_use]
pub fn has_update_operator(data: &Document) -> bool {
    data.keys().any(|key| DOC_UPDATE_OPS.contains(&key.as_str()))
}

/// Fills `created_by` and `created_at` when missing.
pub fn sync_created_audit(doc: &mut Document, actor: &str) {
    if !doc.contains_key(FIELD_CREATED_BY) {
        doc.insert(FIELD_CREATED_BY, actor);
    }
    if !doc.contains_key(FIELD_CREATED_AT) {
        doc.insert(FIELD_CREATED_AT, DateTime::now());
    }
}

/// Fills `updated_by` and `updated_at` when missing.
pub fn sync_updated_audit(doc: &mut Document, actor: &str) {
    if !doc.contains_key(FIELD_UPDATED_BY) {
        doc.insert(FIELD_UPDATED_BY, actor);
    }
    if !doc.contains_key(FIELD_UPDATED_AT) {
        doc.insert(FIELD_UPDATED_AT, DateTime::now());
    }
}

/// Turns plain field values into a `$set` update, keeping operator documents as they are.
fn into_operator_doc(data: Document) -> Document {
    if has_update_operator(&data) {
        return data;
    }
    let mut update = Document::new();
    update.insert(OP_SET, data);
    update
}

/// Adds the created audit to `$setOnInsert`, skipping fields the update already sets.
fn add_created_on_insert(update: &mut Document, actor: &str) {
    let mut audit = Document::new();
    sync_created_audit(&mut audit, actor);
    let already_set = |key: &str| update.get_document(OP_SET).is_ok_and(|set| set.contains_key(key));
    let created: Vec<(String, Bson)> =
        audit.into_iter().filter(|(key, _)| !already_set(key)).collect();

    match update.get_document_mut(OP_SET_ON_INSERT) {
        Ok(on_insert) => {
            for (key, value) in created {
                if !on_insert.contains_key(&key) {
                    on_insert.insert(key, value);
                }
            }
        },
        Err(_) if !created.is_empty() => {
            update.insert(OP_SET_ON_INSERT, created.into_iter().collect::<Document>());
        },
        Err(_) => {},
    }
}

fn add_updated_to_set(update: &mut Document, actor: &str) {
    match update.get_document_mut(OP_SET) {
        Ok(set) => sync_updated_audit(set, actor),
        Err(_) => {
            let mut set = Document::new();
            sync_updated_audit(&mut set, actor);
            update.insert(OP_SET, set);
        },
    }
}

/// The update document of a single `update` call.
///
/// Plain data becomes `{$set: data, $setOnInsert: created-audit}`. The updated audit
/// always lands in `$set`.
#[must_use]
pub fn compose_update(data: Document, actor: &str) -> Document {
    let plain = !has_update_operator(&data);
    let mut update = into_operator_doc(data);
    if plain {
        add_created_on_insert(&mut update, actor);
    }
    add_updated_to_set(&mut update, actor);
    update
}

/// The update document of a buffered bulk update: updated audit in `$set` and created audit
/// in `$setOnInsert`.
#[must_use]
pub fn compose_bulk_update(data: Document, actor: &str) -> Document {
    let mut update = into_operator_doc(data);
    add_updated_to_set(&mut update, actor);
    add_created_on_insert(&mut update, actor);
    update
}

/// Overlays `changes` on a stored record and refreshes its updated audit.
///
/// `_id` is dropped since it cannot be part of a `$set`.
#[must_use]
pub fn merge_record(mut stored: Document, changes: Document, actor: &str) -> Document {
    stored.remove(FIELD_UPDATED_AT);
    stored.remove(FIELD_UPDATED_BY);
    for (key, value) in changes {
        stored.insert(key, value);
    }
    stored.remove(FIELD_ID);
    sync_updated_audit(&mut stored, actor);
    stored
}

/// The `_id` of `doc`, if any.
#[must_use]
pub fn doc_id(doc: &Document) -> Option<&Bson> {
    doc.get(FIELD_ID).filter(|id| !matches!(id, Bson::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_operator_detection() {
        assert!(has_update_operator(&doc! { "$inc": { "n": 1 } }));
        assert!(!has_update_operator(&doc! { "name": "x", "nested": { "$set": 1 } }));
        assert_eq!(DOC_UPDATE_OPS.len(), 19);
    }

    #[test]
    fn test_audit_fields_are_not_overwritten() {
        let mut doc = doc! { "created_by": "alice" };
        sync_created_audit(&mut doc, "bob");
        assert_eq!(doc.get_str("created_by").unwrap(), "alice");
        assert!(doc.get_datetime("created_at").is_ok());
    }

    #[test]
    fn test_plain_update_gets_set_and_set_on_insert() {
        let update = compose_update(doc! { "name": "x" }, "svc");
        let set = update.get_document(OP_SET).unwrap();
        assert_eq!(set.get_str("name").unwrap(), "x");
        assert_eq!(set.get_str("updated_by").unwrap(), "svc");
        assert!(set.get_datetime("updated_at").is_ok());

        let on_insert = update.get_document(OP_SET_ON_INSERT).unwrap();
        assert_eq!(on_insert.get_str("created_by").unwrap(), "svc");
        assert!(!on_insert.contains_key("updated_by"));
    }

    #[test]
    fn test_operator_update_gets_set_added() {
        let update = compose_update(doc! { "$inc": { "n": 1 } }, "svc");
        assert_eq!(update.get_document(OP_INC).unwrap().get_i32("n").unwrap(), 1);
        assert_eq!(update.get_document(OP_SET).unwrap().get_str("updated_by").unwrap(), "svc");
        assert!(!update.contains_key(OP_SET_ON_INSERT));
    }

    #[test]
    fn test_created_audit_does_not_conflict_with_set() {
        let update = compose_update(doc! { "created_by": "import" }, "svc");
        let on_insert = update.get_document(OP_SET_ON_INSERT).unwrap();
        assert!(!on_insert.contains_key("created_by"));
        assert!(on_insert.contains_key("created_at"));
    }

    #[test]
    fn test_bulk_update_has_both_audits() {
        let update = compose_bulk_update(doc! { "$set": { "a": 1 } }, "svc");
        assert_eq!(update.get_document(OP_SET).unwrap().get_str("updated_by").unwrap(), "svc");
        assert_eq!(update.get_document(OP_SET_ON_INSERT).unwrap().get_str("created_by").unwrap(), "svc");
    }

    #[test]
    fn test_merge_record_refreshes_update_audit() {
        let stored = doc! { "_id": 1, "a": 1, "b": 2, "updated_by": "old" };
        let merged = merge_record(stored, doc! { "_id": 1, "b": 3 }, "svc");
        assert_eq!(merged.get_i32("a").unwrap(), 1);
        assert_eq!(merged.get_i32("b").unwrap(), 3);
        assert_eq!(merged.get_str("updated_by").unwrap(), "svc");
        assert!(!merged.contains_key("_id"));
    }
}
