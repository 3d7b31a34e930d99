use crate::core::{Document, Patch};
use serde_json::Value as JsonValue;

/// Builds the document to write from the current base document and a patch.
///
/// The returned document is written as-is, so it must keep the base `rev`
/// for updates to succeed. Closures with the matching signature implement
/// this trait.
pub trait Patcher: Send + Sync {
    fn patch(&self, base: &Document, patch: &Patch) -> Document;
}

impl<F> Patcher for F
where
    F: Fn(&Document, &Patch) -> Document + Send + Sync,
{
    fn patch(&self, base: &Document, patch: &Patch) -> Document {
        self(base, patch)
    }
}

/// Default patcher: shallow overlay of the patch fields onto the base.
///
/// Only top-level fields are considered. Nested objects are replaced, not
/// merged. A JSON `null` in the patch deletes that field from the base.
/// The base `_id` and `_rev` are kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlayPatcher;

impl Patcher for OverlayPatcher {
    fn patch(&self, base: &Document, patch: &Patch) -> Document {
        let mut doc = base.clone();
        for (key, value) in &patch.fields {
            match value {
                JsonValue::Null => {
                    doc.fields.remove(key);
                }
                value => {
                    doc.fields.insert(key.clone(), value.clone());
                }
            }
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_overlay_sets_and_overrides() {
        let base = Document::new("a").with_rev("1-x").set("foo", "bar").set("keep", 1);
        let patch = Patch::new("a").set("foo", "baz").set("fooo", "barr");

        let doc = OverlayPatcher.patch(&base, &patch);
        assert_eq!(
            doc.to_json(),
            json!({ "_id": "a", "_rev": "1-x", "foo": "baz", "fooo": "barr", "keep": 1 })
        );
    }

    #[test]
    fn test_overlay_null_deletes_field() {
        let base = Document::new("a").set("foo", "bar").set("gone", true);
        let patch = Patch::new("a").unset("gone").unset("never-there");

        let doc = OverlayPatcher.patch(&base, &patch);
        assert_eq!(doc.to_json(), json!({ "_id": "a", "foo": "bar" }));
    }

    #[test]
    fn test_overlay_replaces_nested_objects() {
        let base = Document::new("a").set("nested", json!({ "x": 1, "y": 2 }));
        let patch = Patch::new("a").set("nested", json!({ "x": 3 }));

        let doc = OverlayPatcher.patch(&base, &patch);
        assert_eq!(doc.get("nested"), Some(&json!({ "x": 3 })));
    }

    #[test]
    fn test_closure_patcher() {
        let patcher = |base: &Document, _patch: &Patch| Document::new(base.id.clone()).set("only", 1);
        let doc = patcher.patch(&Document::new("a").set("foo", 1), &Patch::new("a"));
        assert_eq!(doc.to_json(), json!({ "_id": "a", "only": 1 }));
    }
}
