//! Built-in analysis settings: the analyzers the built-in mapping references

use crate::drift::ConfigTree;
use serde_json::json;

pub fn build_analysis() -> ConfigTree {
    let analysis = json!({
        "analyzer": {
            "text": {
                "type": "custom",
                "tokenizer": "standard",
                "filter": ["lowercase", "asciifolding", "kstem"]
            },
            "plain": {
                "type": "custom",
                "tokenizer": "standard",
                "filter": ["lowercase"]
            },
            "plain_search": {
                "type": "custom",
                "tokenizer": "standard",
                "filter": ["lowercase"]
            },
            "suggest": {
                "type": "custom",
                "tokenizer": "standard",
                "filter": ["lowercase", "suggest_shingle"]
            },
            "prefix": {
                "type": "custom",
                "tokenizer": "prefix",
                "filter": ["lowercase"]
            },
            "near_match": {
                "type": "custom",
                "tokenizer": "keyword",
                "filter": ["lowercase"]
            },
            "word_prefix": {
                "type": "custom",
                "tokenizer": "standard",
                "filter": ["lowercase", "prefix_ngram_filter"]
            },
            "keyword": {
                "type": "custom",
                "tokenizer": "keyword"
            },
            "lowercase_keyword": {
                "type": "custom",
                "tokenizer": "keyword",
                "filter": ["lowercase"]
            }
        },
        "filter": {
            "suggest_shingle": {
                "type": "shingle",
                "min_shingle_size": 2,
                "max_shingle_size": 3,
                "output_unigrams": true
            },
            "prefix_ngram_filter": {
                "type": "edge_ngram",
                "max_gram": 255
            }
        },
        "tokenizer": {
            "prefix": {
                "type": "edge_ngram",
                "max_gram": 255
            }
        }
    });
    ConfigTree::from_json(analysis).unwrap_or_default()
}
