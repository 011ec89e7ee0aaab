// Copyright 2025 Cowboy AI, LLC.

//! Record filtering for adapters that evaluate queries in process
//!
//! A filter is a JSON object matched against a stored record:
//!
//! - a plain key compares the record's value at that key, recursing into
//!   nested objects, so `{ "address": { "city": "London" } }` matches on
//!   `address.city` alone
//! - `$exists` / `$missing` test whether a non-null value is present
//! - `$like` matches a whole string case-insensitively, `%` standing for
//!   any run of characters and `_` for exactly one
//! - `$contains` tests array membership, where the argument may itself be a
//!   filter, or substring membership for strings
//! - `$or` / `$not` take an object (any / none of its key conditions) or an
//!   array (any / none of its sub-filters)
//!
//! Numbers compare by value, so `1` matches `1.0`. A reference stub such as
//! `{ "$ref": "u1", "$type": "User" }` is matched as nested equality.

use serde_json::Value as Json;

/// Whether `record` satisfies `filter`
pub fn matches(record: &Json, filter: &Json) -> bool {
    match_condition(Some(record), filter)
}

fn match_condition(target: Option<&Json>, condition: &Json) -> bool {
    match condition {
        Json::Object(entries) => entries
            .iter()
            .all(|(key, argument)| match_entry(target, key, argument)),
        expected => target.is_some_and(|actual| equal(actual, expected)),
    }
}

fn match_entry(target: Option<&Json>, key: &str, argument: &Json) -> bool {
    match key {
        "$exists" => present(target) == truthy(argument),
        "$missing" => !present(target) == truthy(argument),
        "$like" => match (target, argument) {
            (Some(Json::String(text)), Json::String(pattern)) => like(text, pattern),
            _ => false,
        },
        "$contains" => contains(target, argument),
        "$or" => target.is_some() && any_of(target, argument),
        "$not" => target.is_some() && !any_of(target, argument),
        field => match_condition(target.and_then(|t| t.get(field)), argument),
    }
}

fn any_of(target: Option<&Json>, argument: &Json) -> bool {
    match argument {
        Json::Array(filters) => filters
            .iter()
            .any(|filter| match_condition(target, filter)),
        Json::Object(entries) => entries
            .iter()
            .any(|(key, condition)| match_entry(target, key, condition)),
        _ => false,
    }
}

fn contains(target: Option<&Json>, argument: &Json) -> bool {
    match (target, argument) {
        (Some(Json::Array(items)), _) => items
            .iter()
            .any(|item| match_condition(Some(item), argument)),
        (Some(Json::String(text)), Json::String(needle)) => text.contains(needle.as_str()),
        _ => false,
    }
}

fn present(target: Option<&Json>) -> bool {
    target.is_some_and(|value| !value.is_null())
}

fn truthy(argument: &Json) -> bool {
    match argument {
        Json::Null => false,
        Json::Bool(b) => *b,
        Json::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Json::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn equal(actual: &Json, expected: &Json) -> bool {
    match (actual, expected) {
        (Json::Number(a), Json::Number(b)) => a.as_f64() == b.as_f64(),
        (Json::Array(a), Json::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| equal(x, y))
        }
        _ => actual == expected,
    }
}

/// SQL `LIKE` over whole strings, case-insensitive
pub fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();

    // Greedy wildcard matching with backtracking to the last `%`
    let (mut t, mut p) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some('%') => {
                star = Some((p, t));
                p += 1;
            }
            Some('_') => {
                t += 1;
                p += 1;
            }
            Some(c) if *c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match star {
                Some((star_p, star_t)) => {
                    p = star_p + 1;
                    t = star_t + 1;
                    star = Some((star_p, star_t + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == '%')
}
