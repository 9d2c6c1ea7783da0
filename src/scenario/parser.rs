//! Step DSL parser
//!
//! Grammar:
//!
//! ```text
//! step   := assert | create | change | delete
//! assert := "assert" ( <count> [<class>] <object> [(is|are) <phase>]
//!                    | api <version> <kind> [<group>] )
//!                    [within <duration>]
//! create := "create" <count> ( <class> <object> | instance[s] of <path> )
//! change := "change" <count> <class> <object> from <phase> to <phase>
//! delete := "delete" <count> ( <class> <object> | instance[s] of <path> )
//! object := "pod"["s"] | "node"["s"]
//! phase  := "pending" | "running" | "succeeded" | "failed" | "unknown"
//! ```
//!
//! Lines are lowercased before parsing; the resource kind of an api assert
//! keeps its original casing because discovery matches kinds exactly.

use std::path::PathBuf;

use crate::phase::PodPhase;
use crate::{Error, Result};

use super::step::{AssertStep, ChangeStep, CreateStep, DeleteStep, Gvk, ObjectKind, Step};

const ASSERT_SYNTAX: &str =
    "assert ( <count> [<class>] <object> [(is|are) <phase>] | api <version> <kind> [<group>] ) [within <duration>]";
const CREATE_SYNTAX: &str = "create <count> ( <class> <object> | instance[s] of <path/to/yaml/file> )";
const CHANGE_SYNTAX: &str = "change <count> <class> <object> from <phase> to <phase>";
const DELETE_SYNTAX: &str = "delete <count> ( <class> <object> | instance[s] of <path/to/yaml/file> )";

/// Parse one scenario line into a typed step.
pub fn parse_step(raw: &str) -> Result<Step> {
    let lowered = raw.to_lowercase();
    let predicate_lower: Vec<&str> = lowered.split_whitespace().collect();
    let predicate_raw: Vec<&str> = raw.split_whitespace().collect();

    if predicate_lower.len() < 3 {
        return Err(Error::parse(
            raw,
            "not enough words (need at least `verb count object`)",
        ));
    }

    let verb = predicate_lower[0];
    let (count, api_assert) = match predicate_lower[1].parse::<u64>() {
        Ok(count) => (count, false),
        Err(_) if verb == "assert" && predicate_lower[1] == "api" => (0, true),
        Err(_) => {
            return Err(Error::parse(
                raw,
                format!(
                    "count must be an unsigned integer (found `{}`)",
                    predicate_lower[1]
                ),
            ))
        }
    };

    let predicate = &predicate_lower[2..];
    match verb {
        "assert" => {
            parse_assert(raw, count, predicate, &predicate_raw[2..], api_assert).map(Step::Assert)
        }
        "create" => parse_create(raw, count, predicate).map(Step::Create),
        "change" => parse_change(raw, count, predicate).map(Step::Change),
        "delete" => parse_delete(raw, count, predicate).map(Step::Delete),
        other => Err(Error::parse(raw, format!("unknown verb `{other}`"))),
    }
}

/// Parse every line of a scenario, tagging failures with the step index.
pub fn parse_steps(raw_steps: &[String]) -> Result<Vec<Step>> {
    let mut steps = Vec::with_capacity(raw_steps.len());
    for (i, raw) in raw_steps.iter().enumerate() {
        let step = parse_step(raw).map_err(|e| match e {
            Error::Parse { message, .. } => {
                Error::parse(raw.clone(), format!("step [{i}]: {message}"))
            }
            other => other,
        })?;
        steps.push(step);
    }
    Ok(steps)
}

fn parse_assert(
    raw: &str,
    count: u64,
    predicate: &[&str],
    predicate_raw: &[&str],
    api_assert: bool,
) -> Result<AssertStep> {
    let syntax = || Error::parse(raw, format!("syntax: {ASSERT_SYNTAX}"));
    let mut step = AssertStep {
        count,
        ..Default::default()
    };

    // `i` always indexes the token held in `next`.
    let mut i = 0;
    let mut next = *predicate.first().ok_or_else(syntax)?;

    if api_assert {
        let mut gvk = Gvk {
            version: next.to_string(),
            ..Default::default()
        };
        i += 1;
        next = *predicate.get(i).ok_or_else(syntax)?;
        if next == "within" {
            return Err(syntax());
        }
        gvk.kind = predicate_raw[i].to_string();
        i += 1;
        match predicate.get(i) {
            None => {
                step.gvk = Some(gvk);
                return Ok(step);
            }
            Some(&token) => {
                next = token;
                if next != "within" {
                    gvk.group = next.to_string();
                    i += 1;
                    match predicate.get(i) {
                        None => {
                            step.gvk = Some(gvk);
                            return Ok(step);
                        }
                        Some(&token) => next = token,
                    }
                }
            }
        }
        step.gvk = Some(gvk);
    } else {
        match parse_object(raw, next) {
            Ok(object) => step.object = Some(object),
            Err(object_err) => {
                // The first token was a class; the object must follow.
                i += 1;
                let token = *predicate.get(i).ok_or(object_err)?;
                step.object = Some(parse_object(raw, token)?);
                step.class = Some(predicate[0].to_string());
            }
        }

        i += 1;
        match predicate.get(i) {
            None => return Ok(step),
            Some(&token) => next = token,
        }

        if next == "is" || next == "are" {
            i += 1;
            next = *predicate.get(i).ok_or_else(syntax)?;
            match next.parse::<PodPhase>() {
                Ok(phase) => {
                    step.phase = Some(phase);
                    i += 1;
                    match predicate.get(i) {
                        None => return Ok(step),
                        Some(&token) => next = token,
                    }
                }
                Err(e) => {
                    if next != "within" {
                        return Err(e);
                    }
                }
            }
        }
    }

    if next == "within" {
        let token = *predicate.get(i + 1).ok_or_else(syntax)?;
        step.within = Some(crate::duration::parse(token).map_err(|_| syntax())?);
        Ok(step)
    } else {
        Err(syntax())
    }
}

fn parse_create(raw: &str, count: u64, predicate: &[&str]) -> Result<CreateStep> {
    let syntax = || Error::parse(raw, format!("syntax: {CREATE_SYNTAX}"));
    match *predicate {
        [instance, "of", path] => {
            if instance.trim_end_matches('s') != "instance" {
                return Err(syntax());
            }
            Ok(CreateStep {
                count,
                class: None,
                object: None,
                path: Some(PathBuf::from(path)),
            })
        }
        [class, object] => Ok(CreateStep {
            count,
            class: Some(class.to_string()),
            object: Some(parse_object(raw, object)?),
            path: None,
        }),
        _ => Err(syntax()),
    }
}

fn parse_change(raw: &str, count: u64, predicate: &[&str]) -> Result<ChangeStep> {
    let syntax = || Error::parse(raw, format!("syntax: {CHANGE_SYNTAX}"));
    let &[class, object, from_kw, from, to_kw, to] = predicate else {
        return Err(syntax());
    };
    if from_kw != "from" || to_kw != "to" {
        return Err(syntax());
    }
    Ok(ChangeStep {
        count,
        class: class.to_string(),
        object: parse_object(raw, object)?,
        from: from.parse()?,
        to: to.parse()?,
    })
}

fn parse_delete(raw: &str, count: u64, predicate: &[&str]) -> Result<DeleteStep> {
    let syntax = || Error::parse(raw, format!("syntax: {DELETE_SYNTAX}"));
    match *predicate {
        [instance, "of", path] => {
            if instance.trim_end_matches('s') != "instance" {
                return Err(syntax());
            }
            Ok(DeleteStep {
                count,
                class: None,
                object: None,
                path: Some(PathBuf::from(path)),
            })
        }
        [class, object] => Ok(DeleteStep {
            count,
            class: Some(class.to_string()),
            object: Some(parse_object(raw, object)?),
            path: None,
        }),
        _ => Err(syntax()),
    }
}

fn parse_object(raw: &str, token: &str) -> Result<ObjectKind> {
    match token.trim().trim_end_matches('s') {
        "pod" => Ok(ObjectKind::Pod),
        "node" => Ok(ObjectKind::Node),
        other => Err(Error::parse(
            raw,
            format!("object must be either `node` or `pod` (found `{other}`)"),
        )),
    }
}
