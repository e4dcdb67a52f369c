//! Mango-style `_find` queries
//!
//! Supported selector subset: implicit field equality, `$eq`, `$in`,
//! `$exists`, `$and`, `$or`. Field names may be dotted paths.

use serde_json::{Map, Value, json};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub field: String,
    pub direction: SortDirection,
}

impl SortField {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// A `_find` request
#[derive(Debug, Clone, PartialEq)]
pub struct FindQuery {
    pub selector: Value,
    pub sort: Vec<SortField>,
    pub limit: Option<usize>,
    pub skip: usize,
}

impl FindQuery {
    pub fn new(selector: Value) -> Self {
        Self {
            selector,
            sort: Vec::new(),
            limit: None,
            skip: 0,
        }
    }

    pub fn sort(mut self, field: SortField) -> Self {
        self.sort.push(field);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Request body for `POST /{db}/_find`
    pub fn to_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("selector".into(), self.selector.clone());
        if !self.sort.is_empty() {
            let sort: Vec<Value> = self
                .sort
                .iter()
                .map(|s| {
                    let dir = match s.direction {
                        SortDirection::Asc => "asc",
                        SortDirection::Desc => "desc",
                    };
                    let mut entry = Map::new();
                    entry.insert(s.field.clone(), Value::from(dir));
                    Value::Object(entry)
                })
                .collect();
            body.insert("sort".into(), Value::Array(sort));
        }
        if let Some(limit) = self.limit {
            body.insert("limit".into(), json!(limit));
        }
        if self.skip > 0 {
            body.insert("skip".into(), json!(self.skip));
        }
        Value::Object(body)
    }
}

/// Selector evaluation error (unsupported operator or wrong operand shape)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorError(pub String);

impl std::fmt::Display for SelectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid selector: {}", self.0)
    }
}

impl std::error::Error for SelectorError {}

fn field<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |cur, key| cur.get(key))
}

/// Evaluate a selector against a document
pub fn matches(doc: &Value, selector: &Value) -> Result<bool, SelectorError> {
    let Some(clauses) = selector.as_object() else {
        return Err(SelectorError("selector must be an object".into()));
    };

    for (key, cond) in clauses {
        let ok = match key.as_str() {
            "$and" => all_of(doc, cond)?,
            "$or" => any_of(doc, cond)?,
            op if op.starts_with('$') => {
                return Err(SelectorError(format!("unsupported operator {}", op)));
            }
            path => field_matches(field(doc, path), cond)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_selectors(cond: &Value) -> Result<&Vec<Value>, SelectorError> {
    cond.as_array()
        .ok_or_else(|| SelectorError("$and/$or expects an array".into()))
}

fn all_of(doc: &Value, cond: &Value) -> Result<bool, SelectorError> {
    for s in sub_selectors(cond)? {
        if !matches(doc, s)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any_of(doc: &Value, cond: &Value) -> Result<bool, SelectorError> {
    for s in sub_selectors(cond)? {
        if matches(doc, s)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn field_matches(value: Option<&Value>, cond: &Value) -> Result<bool, SelectorError> {
    let operators = match cond {
        Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => map,
        _ => return Ok(value == Some(cond)),
    };

    for (op, operand) in operators {
        let ok = match op.as_str() {
            "$eq" => value == Some(operand),
            "$in" => {
                let options = operand
                    .as_array()
                    .ok_or_else(|| SelectorError("$in expects an array".into()))?;
                value.is_some_and(|v| options.contains(v))
            }
            "$exists" => {
                let want = operand
                    .as_bool()
                    .ok_or_else(|| SelectorError("$exists expects a boolean".into()))?;
                value.is_some() == want
            }
            other => return Err(SelectorError(format!("unsupported operator {}", other))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Collation close to CouchDB's: null < bool < number < string < array < object
fn type_rank(v: Option<&Value>) -> u8 {
    match v {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Order documents by a sort specification
pub fn sort_docs(docs: &mut [Value], sort: &[SortField]) {
    docs.sort_by(|a, b| {
        for s in sort {
            let ord = compare_values(field(a, &s.field), field(b, &s.field));
            let ord = match s.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> Value {
        json!({
            "type": "event",
            "user_id": "42",
            "slug": "gala",
            "settings": { "public": true },
            "created_at": "2026-01-01T00:00:00Z"
        })
    }

    #[test]
    fn test_implicit_equality_and_paths() {
        let doc = event();
        assert!(matches(&doc, &json!({"type": "event", "user_id": "42"})).unwrap());
        assert!(!matches(&doc, &json!({"type": "event", "user_id": "43"})).unwrap());
        assert!(matches(&doc, &json!({"settings.public": true})).unwrap());
    }

    #[test]
    fn test_operators() {
        let doc = event();
        assert!(matches(&doc, &json!({"slug": {"$eq": "gala"}})).unwrap());
        assert!(matches(&doc, &json!({"slug": {"$in": ["x", "gala"]}})).unwrap());
        assert!(matches(&doc, &json!({"postgres_event_id": {"$exists": false}})).unwrap());
        assert!(!matches(&doc, &json!({"slug": {"$exists": false}})).unwrap());
        assert!(
            matches(
                &doc,
                &json!({"$or": [{"user_id": "1"}, {"$and": [{"type": "event"}, {"slug": "gala"}]}]})
            )
            .unwrap()
        );
    }

    #[test]
    fn test_malformed_selector() {
        let doc = event();
        assert!(matches(&doc, &json!({"slug": {"$regex": "g.*"}})).is_err());
        assert!(matches(&doc, &json!({"$nor": []})).is_err());
        assert!(matches(&doc, &json!({"slug": {"$in": "gala"}})).is_err());
        assert!(matches(&doc, &json!("event")).is_err());
    }

    #[test]
    fn test_sort_missing_first_then_desc() {
        let mut docs = vec![
            json!({"n": 2, "s": "b"}),
            json!({"s": "z"}),
            json!({"n": 10, "s": "a"}),
        ];
        sort_docs(&mut docs, &[SortField::asc("n")]);
        assert_eq!(docs[0]["s"], "z");
        assert_eq!(docs[2]["n"], 10);

        sort_docs(&mut docs, &[SortField::desc("s")]);
        assert_eq!(docs[0]["s"], "z");
        assert_eq!(docs[2]["s"], "a");
    }

    #[test]
    fn test_find_body() {
        let q = FindQuery::new(json!({"type": "event"}))
            .sort(SortField::desc("updated_at"))
            .limit(5);
        let body = q.to_body();
        assert_eq!(body["sort"][0]["updated_at"], "desc");
        assert_eq!(body["limit"], 5);
        assert!(body.get("skip").is_none());
    }
}
