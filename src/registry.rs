use std::str::FromStr;

use ahash::AHashMap;
use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::{debug, trace};

use crate::{compiler::CompileError, util::*};

const POS_SELF: u8 = 1 << 0;
const POS_PROP: u8 = 1 << 1;
const POS_ITEM: u8 = 1 << 2;

/// keywords holding subschemas, with the positions they hold them at.
static SUBSCHEMAS: Lazy<AHashMap<&'static str, u8>> = Lazy::new(|| {
    AHashMap::from_iter([
        // type agnostic
        ("definitions", POS_PROP),
        ("not", POS_SELF),
        ("allOf", POS_ITEM),
        ("anyOf", POS_ITEM),
        ("oneOf", POS_ITEM),
        // object
        ("properties", POS_PROP),
        ("additionalProperties", POS_SELF),
        ("patternProperties", POS_PROP),
        ("dependencies", POS_PROP),
        // array
        ("items", POS_SELF | POS_ITEM),
        ("additionalItems", POS_SELF),
    ])
});

pub(crate) type NodeId = usize;

pub(crate) struct Document {
    pub(crate) id: String,
    pub(crate) doc: Value,
}

pub(crate) struct Node {
    /// `<schema id>#<json-pointer>`
    pub(crate) path: String,
    pub(crate) doc: usize,
    pub(crate) ptr: String,
    /// node this `$ref` node delegates to.
    pub(crate) target: Option<NodeId>,
}

/// Indexes schema documents and every subschema reachable from them by
/// path, with all `$ref`s resolved to node ids.
#[derive(Default)]
pub(crate) struct Registry {
    pub(crate) docs: Vec<Document>,
    pub(crate) nodes: Vec<Node>,
    index: AHashMap<String, NodeId>,
    ids: AHashMap<String, usize>,
}

impl Registry {
    pub(crate) fn build(schemas: Vec<Value>) -> Result<Self, CompileError> {
        let mut reg = Self::default();
        let mut pending = vec![];
        for (position, doc) in schemas.into_iter().enumerate() {
            reg.add_document(position, doc, &mut pending)?;
        }
        debug!(
            docs = reg.docs.len(),
            nodes = reg.nodes.len(),
            refs = pending.len(),
            "indexed schemas"
        );
        reg.resolve(pending)?;
        reg.check_ref_cycles()?;
        Ok(reg)
    }

    fn add_document(
        &mut self,
        position: usize,
        doc: Value,
        pending: &mut Vec<NodeId>,
    ) -> Result<(), CompileError> {
        let Value::Object(obj) = &doc else {
            return Err(CompileError::NotAnObject { position });
        };
        let id = match obj.get("id") {
            None => position.to_string(),
            Some(Value::String(id)) => {
                let id = id.strip_suffix('#').unwrap_or(id);
                if id.is_empty() {
                    return Err(CompileError::InvalidId { position });
                }
                id.to_owned()
            }
            Some(_) => return Err(CompileError::InvalidId { position }),
        };
        if self.ids.contains_key(&id) {
            return Err(CompileError::DuplicateId { id });
        }

        let index = self.docs.len();
        self.ids.insert(id.clone(), index);
        self.docs.push(Document { id, doc });
        self.collect(index, String::new(), pending);
        Ok(())
    }

    /// indexes node at `ptr` in document and all its subschemas.
    fn collect(&mut self, doc: usize, ptr: String, pending: &mut Vec<NodeId>) {
        let mut ptrs = vec![];
        if let Some(v) = lookup_ptr(&self.docs[doc].doc, &ptr) {
            collect_ptrs(v, ptr, &mut ptrs);
        }
        for ptr in ptrs {
            let path = format!("{}#{ptr}", self.docs[doc].id);
            if self.index.contains_key(&path) {
                continue;
            }
            let is_ref = lookup_ptr(&self.docs[doc].doc, &ptr)
                .map_or(false, |v| v.get("$ref").is_some());
            let id = self.nodes.len();
            self.nodes.push(Node {
                path: path.clone(),
                doc,
                ptr,
                target: None,
            });
            self.index.insert(path, id);
            if is_ref {
                pending.push(id);
            }
        }
    }

    fn resolve(&mut self, mut pending: Vec<NodeId>) -> Result<(), CompileError> {
        while let Some(id) = pending.pop() {
            let from = self.nodes[id].path.clone();
            let Some(Value::String(reference)) = self.value(id).and_then(|v| v.get("$ref")) else {
                return Err(CompileError::InvalidKeyword {
                    path: from,
                    keyword: "$ref".to_owned(),
                    reason: "must be a string".to_owned(),
                });
            };
            let reference = reference.clone();
            let unresolved = || CompileError::UnresolvedRef {
                path: from.clone(),
                reference: reference.clone(),
            };

            let (schema_id, fragment) = split(&reference);
            let doc = if schema_id.is_empty() {
                self.nodes[id].doc
            } else {
                *self.ids.get(schema_id).ok_or_else(unresolved)?
            };
            let ptr = path_unescape(fragment).map_err(|_| unresolved())?;
            let path = format!("{}#{ptr}", self.docs[doc].id);

            let target = match self.index.get(&path) {
                Some(&target) => target,
                None => {
                    // points outside the standard subschema locations
                    match lookup_ptr(&self.docs[doc].doc, &ptr) {
                        Some(Value::Object(_)) => {}
                        _ => return Err(unresolved()),
                    }
                    self.collect(doc, ptr, &mut pending);
                    *self.index.get(&path).ok_or_else(unresolved)?
                }
            };
            trace!(from = %from, to = %path, "resolved $ref");
            self.nodes[id].target = Some(target);
        }
        Ok(())
    }

    /// rejects chains of `$ref`-only nodes that loop back on themselves,
    /// since they never reach a keyword to evaluate.
    fn check_ref_cycles(&self) -> Result<(), CompileError> {
        let mut done = vec![false; self.nodes.len()];
        for start in 0..self.nodes.len() {
            let mut seen = vec![];
            let mut cur = start;
            while let Some(next) = self.nodes[cur].target {
                if done[cur] {
                    break;
                }
                if seen.contains(&cur) {
                    return Err(CompileError::RefCycle {
                        path: self.nodes[cur].path.clone(),
                    });
                }
                seen.push(cur);
                cur = next;
            }
            for id in seen {
                done[id] = true;
            }
        }
        Ok(())
    }

    pub(crate) fn value(&self, node: NodeId) -> Option<&Value> {
        let node = self.nodes.get(node)?;
        lookup_ptr(&self.docs[node.doc].doc, &node.ptr)
    }

    pub(crate) fn lookup(&self, path: &str) -> Option<NodeId> {
        self.index.get(path).copied()
    }

    pub(crate) fn roots(&self) -> impl Iterator<Item = (&str, NodeId)> + '_ {
        self.docs
            .iter()
            .filter_map(|d| Some((d.id.as_str(), self.lookup(&format!("{}#", d.id))?)))
    }
}

fn collect_ptrs(v: &Value, ptr: String, ptrs: &mut Vec<String>) {
    let Value::Object(obj) = v else {
        return;
    };
    ptrs.push(ptr.clone());
    for (kw, v) in obj {
        let Some(&pos) = SUBSCHEMAS.get(kw.as_str()) else {
            continue;
        };
        let ptr = format!("{ptr}/{}", escape(kw));
        if pos & POS_SELF != 0 && v.is_object() {
            collect_ptrs(v, ptr.clone(), ptrs);
        }
        if pos & POS_ITEM != 0 {
            if let Value::Array(arr) = v {
                for (i, item) in arr.iter().enumerate() {
                    collect_ptrs(item, format!("{ptr}/{i}"), ptrs);
                }
            }
        }
        if pos & POS_PROP != 0 {
            if let Value::Object(obj) = v {
                for (pname, pvalue) in obj {
                    collect_ptrs(pvalue, format!("{ptr}/{}", escape(pname)), ptrs);
                }
            }
        }
    }
}

pub(crate) fn lookup_ptr<'a>(mut v: &'a Value, ptr: &str) -> Option<&'a Value> {
    for tok in ptr_tokens(ptr) {
        v = match v {
            Value::Object(obj) => obj.get(&tok)?,
            Value::Array(arr) => arr.get(usize::from_str(&tok).ok()?)?,
            _ => return None,
        };
    }
    Some(v)
}
