//! `key=value` deployment arguments rendered as YAML values for the cluster
//! agent.
//!
//! Each argument holds one or more comma separated assignments. Dotted keys
//! build nested maps, `{a,b}` values become lists, and `true`, `false`, `null`
//! and integers are typed.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("argument {argument:?}: key {key:?} has no value")]
    MissingValue { argument: String, key: String },
    #[error("argument {argument:?}: empty key")]
    EmptyKey { argument: String },
    #[error("argument {argument:?}: unterminated list")]
    UnterminatedList { argument: String },
    #[error("failed to render arguments: {0}")]
    Render(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<ArgValue>),
    Map(BTreeMap<String, ArgValue>),
}

pub type ArgValues = BTreeMap<String, ArgValue>;

pub fn parse_arguments(arguments: &[String]) -> Result<ArgValues, ArgumentError> {
    let mut values = ArgValues::new();
    for argument in arguments {
        parse_into(argument, &mut values)?;
    }
    Ok(values)
}

/// YAML bytes sent as the start command's raw values.
///
/// Nothing is rendered when there are no arguments. A malformed argument is
/// logged and yields empty values.
pub fn render_values(arguments: &[String]) -> Vec<u8> {
    if arguments.is_empty() {
        return Vec::new();
    }
    match parse_arguments(arguments).and_then(|values| to_yaml(&values)) {
        Ok(yaml) => yaml.into_bytes(),
        Err(err) => {
            warn!(%err, "ignoring deployment arguments");
            Vec::new()
        }
    }
}

pub fn to_yaml(values: &ArgValues) -> Result<String, ArgumentError> {
    serde_yaml::to_string(values).map_err(|err| ArgumentError::Render(err.to_string()))
}

fn parse_into(argument: &str, values: &mut ArgValues) -> Result<(), ArgumentError> {
    let chars: Vec<char> = argument.chars().collect();
    let mut pos = 0;
    while pos < chars.len() {
        let key_start = pos;
        while pos < chars.len() && chars[pos] != '=' && chars[pos] != ',' {
            pos += 1;
        }
        let key: String = chars[key_start..pos].iter().collect();
        if pos >= chars.len() || chars[pos] == ',' {
            return Err(ArgumentError::MissingValue {
                argument: argument.to_string(),
                key,
            });
        }
        pos += 1;

        let path = split_key(argument, &key)?;
        let value = if chars.get(pos) == Some(&'{') {
            let close = chars[pos..]
                .iter()
                .position(|c| *c == '}')
                .map(|offset| pos + offset)
                .ok_or_else(|| ArgumentError::UnterminatedList {
                    argument: argument.to_string(),
                })?;
            let inner: String = chars[pos + 1..close].iter().collect();
            pos = close + 1;
            let items = if inner.is_empty() {
                Vec::new()
            } else {
                inner.split(',').map(typed_value).collect()
            };
            ArgValue::List(items)
        } else {
            let value_start = pos;
            while pos < chars.len() && chars[pos] != ',' {
                pos += 1;
            }
            typed_value(&chars[value_start..pos].iter().collect::<String>())
        };

        insert(values, &path, value);

        if chars.get(pos) == Some(&',') {
            pos += 1;
        }
    }
    Ok(())
}

fn split_key(argument: &str, key: &str) -> Result<Vec<String>, ArgumentError> {
    let path: Vec<String> = key.split('.').map(|part| part.trim().to_string()).collect();
    if path.iter().any(String::is_empty) {
        return Err(ArgumentError::EmptyKey {
            argument: argument.to_string(),
        });
    }
    Ok(path)
}

fn typed_value(raw: &str) -> ArgValue {
    match raw {
        "true" => ArgValue::Bool(true),
        "false" => ArgValue::Bool(false),
        "null" => ArgValue::Null,
        _ => {
            // Leading zeros stay strings so values like "007" survive.
            let leading_zero = raw.len() > 1 && raw.starts_with('0');
            match raw.parse::<i64>() {
                Ok(int) if !leading_zero => ArgValue::Int(int),
                _ => ArgValue::Str(raw.to_string()),
            }
        }
    }
}

fn insert(values: &mut ArgValues, path: &[String], value: ArgValue) {
    match path {
        [] => {}
        [last] => {
            values.insert(last.clone(), value);
        }
        [head, rest @ ..] => {
            let entry = values
                .entry(head.clone())
                .or_insert_with(|| ArgValue::Map(BTreeMap::new()));
            if let ArgValue::Map(map) = entry {
                insert(map, rest, value);
            } else {
                // A scalar set earlier is replaced by the nested map.
                let mut map = BTreeMap::new();
                insert(&mut map, rest, value);
                *entry = ArgValue::Map(map);
            }
        }
    }
}
