use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Key rewriting applied to every object in a listing tree.
///
/// An alias replaces a key verbatim. Keys without an alias lose every
/// occurrence of the strip substring (the vendor marks XML attributes with a
/// leading `@`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRules {
    aliases: BTreeMap<String, String>,
    strip: Option<String>,
}

impl Default for RenameRules {
    fn default() -> Self {
        Self {
            aliases: BTreeMap::new(),
            strip: Some("@".to_string()),
        }
    }
}

impl RenameRules {
    pub fn new(aliases: BTreeMap<String, String>, strip: Option<String>) -> Self {
        Self {
            aliases,
            strip: strip.filter(|s| !s.is_empty()),
        }
    }

    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }

    pub fn strip(&self) -> Option<&str> {
        self.strip.as_deref()
    }

    pub fn rename(&self, key: &str) -> String {
        if let Some(alias) = self.aliases.get(key) {
            return alias.clone();
        }
        match &self.strip {
            Some(strip) => key.replace(strip.as_str(), ""),
            None => key.to_string(),
        }
    }
}

/// Returns a copy of `value` with every object key rewritten by `rules`.
///
/// Arrays keep their length and order and leaves are untouched. When two
/// keys of one object rename to the same name, the key that sorts last in
/// the source object wins.
pub fn deep_rename_keys(value: &Value, rules: &RenameRules) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| deep_rename_keys(item, rules))
                .collect(),
        ),
        Value::Object(map) => {
            let mut renamed = Map::with_capacity(map.len());
            for (key, inner) in map {
                renamed.insert(rules.rename(key), deep_rename_keys(inner, rules));
            }
            Value::Object(renamed)
        }
        leaf => leaf.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn aliases(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[test]
    fn strips_attribute_markers_recursively() {
        let input = json!({"@id": 5, "nested": {"@type": "flat"}});
        let out = deep_rename_keys(&input, &RenameRules::default());
        assert_eq!(out, json!({"id": 5, "nested": {"type": "flat"}}));
    }

    #[test]
    fn strips_every_occurrence() {
        let rules = RenameRules::new(BTreeMap::new(), Some("@".into()));
        assert_eq!(rules.rename("@xlink@href"), "xlinkhref");
    }

    #[test]
    fn alias_takes_precedence_over_stripping() {
        let rules = RenameRules::new(aliases(&[("@xsi.type", "@kind")]), Some("@".into()));
        let out = deep_rename_keys(&json!({"@xsi.type": "x", "@id": 1}), &rules);
        assert_eq!(out, json!({"@kind": "x", "id": 1}));
    }

    #[test]
    fn arrays_keep_length_and_order() {
        let input = json!([{"@a": 1}, 2, [{"@b": 3}], null, "s"]);
        let out = deep_rename_keys(&input, &RenameRules::default());
        assert_eq!(out, json!([{"a": 1}, 2, [{"b": 3}], null, "s"]));
    }

    #[test]
    fn leaves_are_returned_unchanged() {
        for leaf in [json!(null), json!(true), json!(1.5), json!("@text")] {
            assert_eq!(deep_rename_keys(&leaf, &RenameRules::default()), leaf);
        }
    }

    #[test]
    fn renaming_is_idempotent_once_clean() {
        let rules = RenameRules::new(aliases(&[("old", "new")]), Some("@".into()));
        let input = json!({"@id": 1, "old": {"@x": [{"@y": 2}]}, "plain": "@v"});
        let once = deep_rename_keys(&input, &rules);
        assert_eq!(deep_rename_keys(&once, &rules), once);
    }

    #[test]
    fn colliding_keys_resolve_to_last_processed() {
        // "@id" sorts before "id", so the unprefixed value is written last.
        let out = deep_rename_keys(&json!({"@id": 1, "id": 2}), &RenameRules::default());
        assert_eq!(out, json!({"id": 2}));
    }

    #[test]
    fn empty_strip_disables_stripping() {
        let rules = RenameRules::new(BTreeMap::new(), Some(String::new()));
        assert_eq!(rules.strip(), None);
        assert_eq!(rules.rename("@id"), "@id");
    }
}
