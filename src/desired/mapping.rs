//! Built-in page mapping

use crate::drift::ConfigTree;
use serde_json::{json, Map, Value};

/// Field option bits for [`MappingBuilder::string_field`]
pub const MINIMAL: u8 = 0;
/// Keep length norms; useful for scored text, wasteful for arrays
pub const ENABLE_NORMS: u8 = 1;
/// Copy the field into `suggest` for "did you mean"
pub const COPY_TO_SUGGEST: u8 = 2;
/// Store extra data to make highlighting long fields cheap
pub const SPEED_UP_HIGHLIGHTING: u8 = 4;

/// Builds the page mapping document
#[derive(Debug, Clone, Default)]
pub struct MappingBuilder {
    prefix_search_starts_with_any_word: bool,
    phrase_use_text: bool,
    optimize_for_experimental_highlighter: bool,
}

impl MappingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix_search_starts_with_any_word(mut self, enabled: bool) -> Self {
        self.prefix_search_starts_with_any_word = enabled;
        self
    }

    pub fn phrase_use_text(mut self, enabled: bool) -> Self {
        self.phrase_use_text = enabled;
        self
    }

    pub fn optimize_for_experimental_highlighter(mut self, enabled: bool) -> Self {
        self.optimize_for_experimental_highlighter = enabled;
        self
    }

    pub fn build(&self) -> ConfigTree {
        let suggest_extra = json!({"analyzer": "suggest"});
        // Never declare `type: object` here; the engine infers it and doesn't echo it back
        let mut title_extra = vec![
            suggest_extra.clone(),
            json!({"analyzer": "prefix", "search_analyzer": "near_match", "index_options": "docs"}),
            json!({"analyzer": "near_match", "index_options": "docs"}),
            json!({"analyzer": "keyword", "index_options": "docs"}),
        ];
        if self.prefix_search_starts_with_any_word {
            title_extra.push(json!({
                "analyzer": "word_prefix",
                "search_analyzer": "plain_search",
                "index_options": "docs"
            }));
        }

        let mut text_extra = Vec::new();
        let mut text_options = ENABLE_NORMS | SPEED_UP_HIGHLIGHTING;
        if self.phrase_use_text {
            text_extra.push(suggest_extra);
            text_options |= COPY_TO_SUGGEST;
        }

        let mut text = self.string_field(text_options, &text_extra);
        text["fields"]["word_count"] = json!({
            "type": "token_count",
            "store": true,
            "analyzer": "plain"
        });

        let mapping = json!({
            "dynamic": false,
            "properties": {
                "timestamp": {"type": "date", "format": "date_optional_time"},
                "namespace": long_field(true),
                "namespace_text": keyword_field(),
                "title": self.string_field(ENABLE_NORMS | COPY_TO_SUGGEST, &title_extra),
                "text": text,
                "auxiliary_text": self.string_field(text_options, &[]),
                "file_text": self.string_field(text_options, &[]),
                "category": lowercase_keyword_field(),
                "template": lowercase_keyword_field(),
                "outgoing_link": keyword_field(),
                "external_link": keyword_field(),
                "heading": self.string_field(SPEED_UP_HIGHLIGHTING, &[]),
                "text_bytes": long_field(false),
                "redirect": {
                    "dynamic": false,
                    "properties": {
                        "namespace": long_field(true),
                        "title": self.string_field(COPY_TO_SUGGEST | SPEED_UP_HIGHLIGHTING, &title_extra),
                    }
                },
                "incoming_links": long_field(true),
                "local_sites_with_dupe": lowercase_keyword_field(),
                "suggest": {"type": "text", "analyzer": "suggest"}
            }
        });
        ConfigTree::from_json(mapping).unwrap_or_default()
    }

    /// Language-analyzed text field with a `plain` subfield plus `extra` subfields,
    /// each named after its index analyzer.
    pub fn string_field(&self, options: u8, extra: &[Value]) -> Value {
        let mut field = json!({
            "type": "text",
            "analyzer": "text",
            "fields": {
                "plain": {
                    "type": "text",
                    "analyzer": "plain",
                    "search_analyzer": "plain_search"
                }
            }
        });

        if self.optimize_for_experimental_highlighter {
            if options & SPEED_UP_HIGHLIGHTING != 0 {
                field["index_options"] = json!("offsets");
                field["fields"]["plain"]["index_options"] = json!("offsets");
            }
        } else {
            field["term_vector"] = json!("with_positions_offsets");
            field["fields"]["plain"]["term_vector"] = json!("with_positions_offsets");
        }

        let disable_norms = options & ENABLE_NORMS == 0;
        if disable_norms {
            field["norms"] = json!(false);
            field["fields"]["plain"]["norms"] = json!(false);
        }
        if options & COPY_TO_SUGGEST != 0 {
            field["copy_to"] = json!(["suggest"]);
        }

        for extra_field in extra {
            let Some(name) = extra_field.get("analyzer").and_then(Value::as_str) else {
                continue;
            };
            let mut subfield = Map::new();
            subfield.insert("type".to_string(), json!("text"));
            if let Some(settings) = extra_field.as_object() {
                subfield.extend(settings.clone());
            }
            if disable_norms {
                subfield.insert("norms".to_string(), json!(false));
            }
            field["fields"][name] = Value::Object(subfield);
        }
        field
    }
}

/// Lowercased, otherwise unanalyzed string
pub fn lowercase_keyword_field() -> Value {
    json!({
        "type": "text",
        "analyzer": "lowercase_keyword",
        "norms": false,
        "index_options": "docs"
    })
}

/// Unanalyzed string
pub fn keyword_field() -> Value {
    json!({
        "type": "text",
        "analyzer": "keyword",
        "norms": false,
        "index_options": "docs"
    })
}

pub fn long_field(indexed: bool) -> Value {
    if indexed {
        json!({"type": "long"})
    } else {
        json!({"type": "long", "index": false})
    }
}
