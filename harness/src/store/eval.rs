// Copyright 2026 Maurice S. Barnum
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Evaluation of the aggregation-stage subset the benchmark variants use: $match, $lookup,
// $unwind, $group, $set, $sort, $skip and $limit.  Errors are plain strings; the caller
// attaches the collection name.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value;

use super::Document;
use super::UpdateOp;

pub(super) type EvalResult<T> = std::result::Result<T, String>;

pub(super) trait Catalog {
    fn documents(&self, collection: &str) -> &[Document];
}

// Values at a dotted path.  Arrays met before the last segment are descended into; a value
// found at the last segment is returned as-is, arrays included.
pub(super) fn resolve<'a>(doc: &'a Document, path: &str) -> Vec<&'a Value> {
    let mut parts = path.split('.');
    let Some(first) = parts.next() else {
        return Vec::new();
    };
    let mut current: Vec<&Value> = doc.get(first).into_iter().collect();
    for part in parts {
        let mut next = Vec::with_capacity(current.len());
        for v in current {
            match v {
                Value::Object(m) => next.extend(m.get(part)),
                Value::Array(items) => {
                    next.extend(items.iter().filter_map(|item| item.get(part)));
                }
                _ => {}
            }
        }
        current = next;
    }
    current
}

fn flatten<'a>(values: Vec<&'a Value>) -> Vec<&'a Value> {
    let mut out = Vec::with_capacity(values.len());
    for v in values {
        match v {
            Value::Array(items) => out.extend(items.iter()),
            other => out.push(other),
        }
    }
    out
}

fn equals_any(values: &[&Value], target: &Value) -> bool {
    values.iter().any(|v| {
        *v == target || matches!(v, Value::Array(items) if items.contains(target))
    })
}

fn is_operator_doc(v: &Value) -> bool {
    matches!(v, Value::Object(m) if m.keys().next().is_some_and(|k| k.starts_with('$')))
}

pub(super) fn matches(doc: &Document, filter: &Document) -> EvalResult<bool> {
    for (path, cond) in filter {
        let values = resolve(doc, path);
        let ok = if let Value::Object(ops) = cond
            && is_operator_doc(cond)
        {
            let mut all = true;
            for (op, arg) in ops {
                all &= match op.as_str() {
                    "$eq" => equals_any(&values, arg),
                    "$ne" => !equals_any(&values, arg),
                    "$exists" => values.is_empty() != arg.as_bool().unwrap_or(true),
                    "$in" => arg
                        .as_array()
                        .ok_or_else(|| format!("$in requires an array, got {arg}"))?
                        .iter()
                        .any(|a| equals_any(&values, a)),
                    other => return Err(format!("unsupported query operator {other}")),
                };
            }
            all
        } else {
            equals_any(&values, cond)
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

// None means "remove the field"
fn eval_expr(doc: &Document, expr: &Value) -> Option<Value> {
    match expr {
        Value::String(s) if s == "$$REMOVE" => None,
        Value::String(s) if s.starts_with('$') => {
            let mut found = resolve(doc, &s[1..]);
            match found.len() {
                0 => None,
                1 => found.pop().cloned(),
                _ => Some(Value::Array(found.into_iter().cloned().collect())),
            }
        }
        literal => Some(literal.clone()),
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

pub(super) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        _ => type_rank(a)
            .cmp(&type_rank(b))
            .then_with(|| a.to_string().cmp(&b.to_string())),
    }
}

fn stage_of(stage: &Value) -> EvalResult<(&str, &Value)> {
    match stage {
        Value::Object(m) if m.len() == 1 => m
            .iter()
            .next()
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| "empty stage".to_string()),
        other => Err(format!("a stage must have exactly one field: {other}")),
    }
}

fn as_object(v: &Value) -> EvalResult<&Document> {
    v.as_object().ok_or_else(|| format!("expected a document, got {v}"))
}

fn str_field<'a>(spec: &'a Document, name: &str) -> EvalResult<&'a str> {
    spec.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing string field {name}"))
}

fn as_count(v: &Value) -> EvalResult<usize> {
    v.as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| format!("expected a non-negative integer, got {v}"))
}

fn field_path(v: &Value) -> EvalResult<&str> {
    v.as_str()
        .and_then(|s| s.strip_prefix('$'))
        .ok_or_else(|| format!("expected a field path, got {v}"))
}

/// Apply a leading `$match` to borrowed documents, cloning only what it selects.  Returns the
/// selected documents and the stages still to run.
pub(super) fn select<'p>(
    docs: &[Document],
    pipeline: &'p [Value],
) -> EvalResult<(Vec<Document>, &'p [Value])> {
    if let Some(first) = pipeline.first() {
        let (name, spec) = stage_of(first)?;
        if name == "$match" {
            let f = as_object(spec)?;
            let mut out = Vec::new();
            for d in docs {
                if matches(d, f)? {
                    out.push(d.clone());
                }
            }
            return Ok((out, &pipeline[1..]));
        }
    }
    Ok((docs.to_vec(), pipeline))
}

pub(super) fn run(
    catalog: &dyn Catalog,
    mut docs: Vec<Document>,
    pipeline: &[Value],
) -> EvalResult<Vec<Document>> {
    for stage in pipeline {
        let (name, spec) = stage_of(stage)?;
        docs = match name {
            "$match" => {
                let f = as_object(spec)?;
                let mut out = Vec::with_capacity(docs.len());
                for d in docs {
                    if matches(&d, f)? {
                        out.push(d);
                    }
                }
                out
            }
            "$lookup" => lookup(catalog, docs, as_object(spec)?)?,
            "$unwind" => unwind(docs, spec)?,
            "$group" => group(docs, as_object(spec)?)?,
            "$set" | "$addFields" => set_fields(docs, as_object(spec)?),
            "$sort" => sort(docs, as_object(spec)?)?,
            "$skip" => docs.into_iter().skip(as_count(spec)?).collect(),
            "$limit" => docs.into_iter().take(as_count(spec)?).collect(),
            other => return Err(format!("unsupported stage {other}")),
        };
    }
    Ok(docs)
}

fn lookup(catalog: &dyn Catalog, docs: Vec<Document>, spec: &Document) -> EvalResult<Vec<Document>> {
    let from = str_field(spec, "from")?;
    let local = str_field(spec, "localField")?;
    let foreign = str_field(spec, "foreignField")?;
    let as_field = str_field(spec, "as")?;
    let sub = spec
        .get("pipeline")
        .map(|p| {
            p.as_array()
                .ok_or_else(|| format!("lookup pipeline must be an array, got {p}"))
        })
        .transpose()?;

    // foreign key -> positions, built once per stage
    let foreign_docs = catalog.documents(from);
    let mut by_key: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, f) in foreign_docs.iter().enumerate() {
        for v in flatten(resolve(f, foreign)) {
            by_key.entry(v.to_string()).or_default().push(i);
        }
    }

    let mut out = Vec::with_capacity(docs.len());
    for mut doc in docs {
        let joined = {
            let mut positions: Vec<usize> = flatten(resolve(&doc, local))
                .into_iter()
                .filter_map(|v| by_key.get(&v.to_string()))
                .flatten()
                .copied()
                .collect();
            positions.sort_unstable();
            positions.dedup();
            let joined: Vec<Document> = positions
                .into_iter()
                .map(|i| foreign_docs[i].clone())
                .collect();
            match sub {
                Some(p) => run(catalog, joined, p)?,
                None => joined,
            }
        };
        doc.insert(
            as_field.to_string(),
            Value::Array(joined.into_iter().map(Value::Object).collect()),
        );
        out.push(doc);
    }
    Ok(out)
}

fn unwind(docs: Vec<Document>, spec: &Value) -> EvalResult<Vec<Document>> {
    let (path, preserve) = match spec {
        Value::Object(m) => (
            field_path(m.get("path").unwrap_or(&Value::Null))?,
            m.get("preserveNullAndEmptyArrays")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        ),
        other => (field_path(other)?, false),
    };

    let mut out = Vec::with_capacity(docs.len());
    for mut doc in docs {
        match doc.remove(path) {
            Some(Value::Array(items)) if !items.is_empty() => {
                for item in items {
                    let mut d = doc.clone();
                    d.insert(path.to_string(), item);
                    out.push(d);
                }
            }
            Some(Value::Array(_)) | Some(Value::Null) | None => {
                if preserve {
                    out.push(doc);
                }
            }
            Some(scalar) => {
                doc.insert(path.to_string(), scalar);
                out.push(doc);
            }
        }
    }
    Ok(out)
}

fn group(docs: Vec<Document>, spec: &Document) -> EvalResult<Vec<Document>> {
    let id_expr = spec
        .get("_id")
        .ok_or_else(|| "$group requires an _id".to_string())?;

    let mut accumulators = Vec::with_capacity(spec.len());
    for (field, acc) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
        let (op, expr) = stage_of(acc)?;
        if !matches!(op, "$first" | "$push" | "$sum") {
            return Err(format!("unsupported accumulator {op}"));
        }
        accumulators.push((field.as_str(), op, expr));
    }

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Document> = Vec::new();
    for doc in &docs {
        let id = eval_expr(doc, id_expr).unwrap_or(Value::Null);
        let key = id.to_string();
        let slot = match index.get(&key) {
            Some(&i) => i,
            None => {
                let mut g = Document::new();
                g.insert("_id".to_string(), id);
                for (field, op, expr) in &accumulators {
                    let initial = match *op {
                        "$first" => eval_expr(doc, expr).unwrap_or(Value::Null),
                        "$push" => Value::Array(Vec::new()),
                        _ => Value::from(0),
                    };
                    g.insert((*field).to_string(), initial);
                }
                groups.push(g);
                index.insert(key, groups.len() - 1);
                // $first is done; fall through so $push and $sum see this document too
                groups.len() - 1
            }
        };

        let g = &mut groups[slot];
        for (field, op, expr) in &accumulators {
            match *op {
                "$push" => {
                    if let Some(v) = eval_expr(doc, expr)
                        && let Some(Value::Array(items)) = g.get_mut(*field)
                    {
                        items.push(v);
                    }
                }
                "$sum" => {
                    let add = eval_expr(doc, expr)
                        .as_ref()
                        .and_then(Value::as_f64)
                        .unwrap_or_default();
                    let prev = g.get(*field).and_then(Value::as_f64).unwrap_or_default();
                    g.insert((*field).to_string(), number(prev + add));
                }
                _ => {}
            }
        }
    }
    Ok(groups)
}

fn set_fields(docs: Vec<Document>, spec: &Document) -> Vec<Document> {
    docs.into_iter()
        .map(|mut doc| {
            // Every expression sees the document as it was before this stage
            let values: Vec<(&String, Option<Value>)> = spec
                .iter()
                .map(|(field, expr)| (field, eval_expr(&doc, expr)))
                .collect();
            for (field, value) in values {
                match value {
                    Some(v) => {
                        doc.insert(field.clone(), v);
                    }
                    None => {
                        doc.remove(field.as_str());
                    }
                }
            }
            doc
        })
        .collect()
}

fn sort(mut docs: Vec<Document>, spec: &Document) -> EvalResult<Vec<Document>> {
    let mut keys = Vec::with_capacity(spec.len());
    for (path, dir) in spec {
        let descending = match dir.as_i64() {
            Some(1) => false,
            Some(-1) => true,
            _ => return Err(format!("sort direction for {path} must be 1 or -1, got {dir}")),
        };
        keys.push((path.as_str(), descending));
    }

    let null = Value::Null;
    docs.sort_by(|a, b| {
        keys.iter().fold(Ordering::Equal, |acc, (path, descending)| {
            acc.then_with(|| {
                let x = resolve(a, path).first().copied().unwrap_or(&null);
                let y = resolve(b, path).first().copied().unwrap_or(&null);
                let o = compare_values(x, y);
                if *descending { o.reverse() } else { o }
            })
        })
    });
    Ok(docs)
}

fn number(x: f64) -> Value {
    serde_json::Number::from_f64(x).map_or(Value::Null, Value::Number)
}

pub(super) fn apply_update(doc: &mut Document, ops: &[UpdateOp]) -> EvalResult<()> {
    for op in ops {
        match op {
            UpdateOp::Set { field, value } => {
                doc.insert(field.clone(), value.clone());
            }
            UpdateOp::Push { field, value } => {
                match doc
                    .entry(field.clone())
                    .or_insert_with(|| Value::Array(Vec::new()))
                {
                    Value::Array(items) => items.push(value.clone()),
                    other => return Err(format!("field {field} is not an array: {other}")),
                }
            }
            UpdateOp::Average { field, of, key } => {
                let avg = match doc.get(of) {
                    Some(Value::Array(items)) => {
                        let samples: Vec<f64> = items
                            .iter()
                            .filter_map(|item| item.get(key.as_str()))
                            .filter_map(Value::as_f64)
                            .collect();
                        if samples.is_empty() {
                            Value::Null
                        } else {
                            #[allow(clippy::cast_precision_loss)]
                            let n = samples.len() as f64;
                            number(samples.iter().sum::<f64>() / n)
                        }
                    }
                    None | Some(Value::Null) => Value::Null,
                    Some(other) => return Err(format!("field {of} is not an array: {other}")),
                };
                doc.insert(field.clone(), avg);
            }
        }
    }
    Ok(())
}
