//! Predicate evaluation for local sources
//!
//! Supports the subset of the MongoDB query language that export predicates
//! use in practice: field equality, `$eq`, `$ne`, `$gt`, `$gte`, `$lt`,
//! `$lte`, `$in`, `$nin`, `$exists`, `$and` and `$or`, on dotted paths. Array
//! fields match when any element matches, as on the server.

use std::cmp::Ordering;

use mongodb::bson::{Bson, Document};

use crate::convert::lookup;
use crate::error::{PartitionSourceError, Result};

fn unsupported(what: impl std::fmt::Display) -> PartitionSourceError {
    PartitionSourceError::new(format!("unsupported filter: {what}"))
}

/// Whether `document` satisfies `filter`.
pub fn matches(document: &Document, filter: &Document) -> Result<bool> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => all_of(document, condition)?,
            "$or" => any_of(document, condition)?,
            op if op.starts_with('$') => return Err(unsupported(format!("operator '{op}'")).into()),
            field => field_matches(lookup(document, field), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses(condition: &Bson) -> Result<Vec<&Document>> {
    let Bson::Array(items) = condition else {
        return Err(unsupported("$and/$or needs an array of documents").into());
    };
    items
        .iter()
        .map(|item| match item {
            Bson::Document(d) => Ok(d),
            other => Err(unsupported(format!("clause {other}")).into()),
        })
        .collect()
}

fn all_of(document: &Document, condition: &Bson) -> Result<bool> {
    for clause in clauses(condition)? {
        if !matches(document, clause)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any_of(document: &Document, condition: &Bson) -> Result<bool> {
    for clause in clauses(condition)? {
        if matches(document, clause)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn is_operator_document(condition: &Bson) -> Option<&Document> {
    match condition {
        Bson::Document(d) if d.keys().next().is_some_and(|k| k.starts_with('$')) => Some(d),
        _ => None,
    }
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> Result<bool> {
    let Some(operators) = is_operator_document(condition) else {
        return Ok(equals(value, condition));
    };

    for (op, operand) in operators {
        let ok = match op.as_str() {
            "$eq" => equals(value, operand),
            "$ne" => !equals(value, operand),
            "$gt" => compares(value, operand, |o| o == Ordering::Greater),
            "$gte" => compares(value, operand, |o| o != Ordering::Less),
            "$lt" => compares(value, operand, |o| o == Ordering::Less),
            "$lte" => compares(value, operand, |o| o != Ordering::Greater),
            "$in" => in_list(value, operand)?,
            "$nin" => !in_list(value, operand)?,
            "$exists" => {
                let wanted = match operand {
                    Bson::Boolean(b) => *b,
                    Bson::Int32(n) => *n != 0,
                    Bson::Int64(n) => *n != 0,
                    other => return Err(unsupported(format!("$exists: {other}")).into()),
                };
                value.is_some() == wanted
            }
            other => return Err(unsupported(format!("operator '{other}'")).into()),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Candidate values of a field: the value itself, plus its elements for arrays.
fn candidates(value: &Bson) -> impl Iterator<Item = &Bson> {
    let elements = match value {
        Bson::Array(items) => items.as_slice(),
        _ => &[],
    };
    std::iter::once(value).chain(elements)
}

fn equals(value: Option<&Bson>, target: &Bson) -> bool {
    match value {
        None => matches!(target, Bson::Null),
        Some(value) => candidates(value).any(|v| same(v, target)),
    }
}

fn same(a: &Bson, b: &Bson) -> bool {
    compare(a, b) == Some(Ordering::Equal) || a == b
}

fn compares(value: Option<&Bson>, target: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    value.is_some_and(|value| {
        candidates(value).any(|v| compare(v, target).is_some_and(&accept))
    })
}

fn in_list(value: Option<&Bson>, operand: &Bson) -> Result<bool> {
    let Bson::Array(targets) = operand else {
        return Err(unsupported("$in/$nin needs an array").into());
    };
    Ok(targets.iter().any(|t| equals(value, t)))
}

/// Order between two comparable BSON values; `None` across unrelated types.
pub fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => Some(x.cmp(y)),
        (Bson::Int32(x), Bson::Int64(y)) => Some(i64::from(*x).cmp(y)),
        (Bson::Int64(x), Bson::Int32(y)) => Some(x.cmp(&i64::from(*y))),
        (Bson::Int64(x), Bson::Int64(y)) => Some(x.cmp(y)),
        (Bson::Double(x), Bson::Double(y)) => x.partial_cmp(y),
        (Bson::Double(x), Bson::Int32(y)) => x.partial_cmp(&f64::from(*y)),
        (Bson::Int32(x), Bson::Double(y)) => f64::from(*x).partial_cmp(y),
        (Bson::Double(x), Bson::Int64(y)) => x.partial_cmp(&(*y as f64)),
        (Bson::Int64(x), Bson::Double(y)) => (*x as f64).partial_cmp(y),
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.timestamp_millis().cmp(&y.timestamp_millis())),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => None,
    }
}
