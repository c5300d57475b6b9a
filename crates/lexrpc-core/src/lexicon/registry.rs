//! Lexicon registry.
//!
//! Flattens lexicon documents into a single immutable map from
//! fully-qualified id (`nsid` or `nsid#name`) to [`Definition`].

use super::schema::{DefType, Definition};
use crate::error::{LexError, Result};
use crate::nsid::Nsid;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Immutable index of every loaded lexicon definition.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    defs: BTreeMap<String, Definition>,
}

impl Registry {
    /// Load lexicon documents, in order.
    ///
    /// Later documents overwrite earlier definitions with the same id. Any
    /// malformed document fails the whole load.
    pub fn load<I>(documents: I) -> Result<Self>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut defs = BTreeMap::new();
        let mut doc_count = 0;

        for (i, doc) in documents.into_iter().enumerate() {
            doc_count += 1;

            let id = doc
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| LexError::MalformedLexicon(format!("Lexicon {i} missing id field")))?;

            let nsid = Nsid::parse(id).map_err(|_| {
                LexError::MalformedLexicon(format!("Lexicon {i} has invalid id {id}"))
            })?;

            let Some(doc_defs) = doc.get("defs") else {
                continue;
            };
            let doc_defs = doc_defs.as_object().ok_or_else(|| {
                LexError::MalformedLexicon(format!("Lexicon {id} defs is not an object"))
            })?;

            for (name, defn) in doc_defs {
                let full_id = nsid.with_def(name).map_err(|_| {
                    LexError::MalformedLexicon(format!("Lexicon {id} has invalid def name {name}"))
                })?;

                let def_type = defn.get("type").and_then(Value::as_str).unwrap_or_default();
                if def_type.parse::<DefType>().is_err() {
                    return Err(LexError::MalformedLexicon(format!(
                        "Bad type for lexicon {full_id}: {def_type}"
                    )));
                }

                let definition: Definition = serde_json::from_value(defn.clone()).map_err(|e| {
                    LexError::MalformedLexicon(format!("Malformed lexicon {full_id}: {e}"))
                })?;

                if defs.insert(full_id.to_string(), definition).is_some() {
                    debug!("Lexicon {} overrides an earlier definition", full_id);
                }
            }
        }

        if defs.is_empty() {
            warn!("No lexicons loaded!");
        } else {
            info!("Loaded {} definitions from {} lexicons", defs.len(), doc_count);
        }

        Ok(Self { defs })
    }

    /// Load the documents bundled with the library.
    pub fn bundled() -> Result<Self> {
        Self::load(super::bundled_documents()?)
    }

    /// Look up a definition by fully-qualified id.
    pub fn get(&self, id: &str) -> Result<&Definition> {
        self.defs.get(id).ok_or_else(|| {
            debug!("{} not found", id);
            LexError::NotFound {
                nsid: id.to_string(),
            }
        })
    }

    /// Look up a query, procedure or subscription.
    pub fn get_method(&self, id: &str) -> Result<&Definition> {
        let def = self.get(id)?;
        if !def.def_type.is_method() {
            return Err(LexError::NotAMethod {
                nsid: id.to_string(),
                def_type: def.def_type.to_string(),
            });
        }
        Ok(def)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.defs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// All fully-qualified ids, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.defs.keys().map(String::as_str)
    }

    /// Ids of all queries, procedures and subscriptions, sorted.
    pub fn methods(&self) -> impl Iterator<Item = (&str, &Definition)> {
        self.defs
            .iter()
            .filter(|(_, def)| def.def_type.is_method())
            .map(|(id, def)| (id.as_str(), def))
    }
}
