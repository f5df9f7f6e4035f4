//! The configuration model: validated value objects parsed from the frozen
//! YAML workflow shape (tasks, data, cycles, parameters, reference specs).
//!
//! The YAML shape is built out of single-key "named" maps (`- my_task: {...}`)
//! rather than structs with a `name` field, so rather than fight `serde`
//! derive macros into that shape we walk the raw [`serde_yaml::Value`] tree
//! by hand and build validated records as we go. Every failure becomes a
//! [`ConfigError`] before any unrolling begins.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::temporal::{self, Date, IsoDuration, TemporalError};

/// Errors raised while parsing or validating the configuration model.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Temporal(#[from] TemporalError),

    #[error("{context}: expected {expected}, found {found}")]
    WrongShape {
        context: String,
        expected: &'static str,
        found: String,
    },

    #[error("{context}: missing required field \"{field}\"")]
    MissingField { context: String, field: String },

    #[error("{context}: {message}")]
    Invalid { context: String, message: String },

    #[error("reference \"{0}\" sets both `lag` and `date`; only one is allowed")]
    RefMutexViolation(String),

    #[error("cycle \"{name}\": start_date {start} lies after end_date {end}")]
    CycleDateOrder { name: String, start: String, end: String },

    #[error("cycle \"{name}\": period {period} is negative or zero")]
    NonPositivePeriod { name: String, period: String },

    #[error("unknown plugin kind: \"{0}\"")]
    UnknownPlugin(String),

    #[error("malformed cli_arguments \"{0}\": unbalanced braces")]
    UnbalancedBraces(String),

    #[error("parameter selector must be \"single\" or \"all\", got \"{0}\"")]
    BadSelector(String),

    #[error("{context} references undeclared parameter \"{parameter}\"")]
    UnknownParameter { context: String, parameter: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// An opaque parameter literal. Numeric YAML scalars are kept as their
/// decimal-string rendering so values stay both `Eq` and `Hash` without
/// pulling a float into the key space; the core never does arithmetic on a
/// parameter value, only equality and list-order comparisons.
#[derive(Clone, Debug, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Num(String),
    Str(String),
}

impl ParamValue {
    pub fn as_str(&self) -> &str {
        match self {
            ParamValue::Num(s) | ParamValue::Str(s) => s,
        }
    }
}

impl PartialEq for ParamValue {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl std::hash::Hash for ParamValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(s) => Ok(ParamValue::Str(s)),
            serde_json::Value::Number(n) => Ok(ParamValue::Num(n.to_string())),
            serde_json::Value::Bool(b) => Ok(ParamValue::Str(b.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "unsupported parameter value: {other:?}"
            ))),
        }
    }
}

fn value_to_param(context: &str, value: &Value) -> Result<ParamValue> {
    match value {
        Value::String(s) => Ok(ParamValue::Str(s.clone())),
        Value::Number(n) => Ok(ParamValue::Num(n.to_string())),
        Value::Bool(b) => Ok(ParamValue::Str(b.to_string())),
        other => Err(ConfigError::WrongShape {
            context: context.to_string(),
            expected: "string or number",
            found: format!("{other:?}"),
        }),
    }
}

/// `parameters: {name: [values]}` — declared at workflow scope, referenced by
/// name everywhere else.
#[derive(Clone, Debug, Default)]
pub struct ParamDecl {
    pub name: String,
    pub values: Vec<ParamValue>,
}

/// Whether a reference broadcasts across a parameter axis or selects the
/// referencing coordinate's own value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Selector {
    Single,
    All,
}

fn parse_selector(context: &str, raw: &str) -> Result<Selector> {
    match raw {
        "single" => Ok(Selector::Single),
        "all" => Ok(Selector::All),
        other => Err(ConfigError::BadSelector(format!("{context}: {other}"))),
    }
}

/// A temporal guard restricting whether a reference spec's items are yielded
/// at all: at most one of `{at, before, after}`.
#[derive(Clone, Debug, Default)]
pub struct WhenGuard {
    pub at: Option<Date>,
    pub before: Option<Date>,
    pub after: Option<Date>,
}

/// How one task-ref names its inputs, outputs, or wait-on targets.
#[derive(Clone, Debug, Default)]
pub struct ReferenceSpec {
    pub name: String,
    pub date: Vec<Date>,
    pub lag: Vec<IsoDuration>,
    pub parameters: IndexMap<String, Selector>,
    pub when: Option<WhenGuard>,
}

fn parse_when(context: &str, value: &Value) -> Result<WhenGuard> {
    let map = value.as_mapping().ok_or_else(|| ConfigError::WrongShape {
        context: context.to_string(),
        expected: "mapping",
        found: format!("{value:?}"),
    })?;
    let mut guard = WhenGuard::default();
    for (k, v) in map {
        let key = k.as_str().unwrap_or_default();
        let raw = v.as_str().ok_or_else(|| ConfigError::WrongShape {
            context: context.to_string(),
            expected: "date string",
            found: format!("{v:?}"),
        })?;
        let date = temporal::parse_date(raw)?;
        match key {
            "at" => guard.at = Some(date),
            "before" => guard.before = Some(date),
            "after" => guard.after = Some(date),
            other => {
                return Err(ConfigError::Invalid {
                    context: context.to_string(),
                    message: format!("unknown `when` key \"{other}\""),
                })
            }
        }
    }
    Ok(guard)
}

fn as_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Sequence(seq) => seq.clone(),
        other => vec![other.clone()],
    }
}

/// Parses one reference entry: either a bare string (`"name"`) or a one-key
/// map (`name: {lag?, date?, when?, parameters?}`).
pub fn parse_reference(context: &str, value: &Value) -> Result<ReferenceSpec> {
    if let Some(name) = value.as_str() {
        return Ok(ReferenceSpec {
            name: name.to_string(),
            ..Default::default()
        });
    }
    let map = value.as_mapping().ok_or_else(|| ConfigError::WrongShape {
        context: context.to_string(),
        expected: "string or one-key mapping",
        found: format!("{value:?}"),
    })?;
    if map.len() != 1 {
        return Err(ConfigError::WrongShape {
            context: context.to_string(),
            expected: "exactly one key",
            found: format!("{} keys", map.len()),
        });
    }
    let (name_value, spec_value) = map.iter().next().expect("checked len == 1");
    let name = name_value
        .as_str()
        .ok_or_else(|| ConfigError::WrongShape {
            context: context.to_string(),
            expected: "string key",
            found: format!("{name_value:?}"),
        })?
        .to_string();

    let mut spec = ReferenceSpec {
        name: name.clone(),
        ..Default::default()
    };
    if spec_value.is_null() {
        return Ok(spec);
    }
    let spec_map = spec_value.as_mapping().ok_or_else(|| ConfigError::WrongShape {
        context: context.to_string(),
        expected: "mapping",
        found: format!("{spec_value:?}"),
    })?;

    let has_key = |key: &str| spec_map.iter().any(|(k, _)| k.as_str() == Some(key));
    let has_lag = has_key("lag");
    let has_date = has_key("date");
    if has_lag && has_date {
        return Err(ConfigError::RefMutexViolation(name));
    }

    for (k, v) in spec_map {
        let key = k.as_str().unwrap_or_default();
        match key {
            "lag" => {
                for item in as_list(v) {
                    let raw = item.as_str().ok_or_else(|| ConfigError::WrongShape {
                        context: context.to_string(),
                        expected: "duration string",
                        found: format!("{item:?}"),
                    })?;
                    spec.lag.push(temporal::parse_duration(raw)?);
                }
            }
            "date" => {
                for item in as_list(v) {
                    let raw = item.as_str().ok_or_else(|| ConfigError::WrongShape {
                        context: context.to_string(),
                        expected: "date string",
                        found: format!("{item:?}"),
                    })?;
                    spec.date.push(temporal::parse_date(raw)?);
                }
            }
            "when" => {
                spec.when = Some(parse_when(context, v)?);
            }
            "parameters" => {
                let pmap = v.as_mapping().ok_or_else(|| ConfigError::WrongShape {
                    context: context.to_string(),
                    expected: "mapping",
                    found: format!("{v:?}"),
                })?;
                for (pk, pv) in pmap {
                    let pname = pk.as_str().unwrap_or_default().to_string();
                    let raw = pv.as_str().ok_or_else(|| ConfigError::WrongShape {
                        context: context.to_string(),
                        expected: "\"single\" or \"all\"",
                        found: format!("{pv:?}"),
                    })?;
                    spec.parameters.insert(pname, parse_selector(context, raw)?);
                }
            }
            other => {
                return Err(ConfigError::Invalid {
                    context: context.to_string(),
                    message: format!("unknown reference key \"{other}\""),
                })
            }
        }
    }
    Ok(spec)
}

/// A single element of a shell task's parsed `cli_arguments`: either a
/// literal token, or a brace-enclosed data reference (`{name}` positional, or
/// `{option name}` option-plus-value).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CliArgElement {
    Literal(String),
    DataRef { name: String, option: Option<String> },
}

/// Splits a shell `cli_arguments` string on whitespace, honoring `{...}`
/// groupings as single tokens (a literal space inside braces does not split
/// the token). Every brace-enclosed token becomes a [`CliArgElement::DataRef`].
pub fn parse_cli_arguments(raw: &str) -> Result<Vec<CliArgElement>> {
    let mut elements = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    let mut in_group = false;

    let push_current = |current: &mut String, in_group: bool, elements: &mut Vec<CliArgElement>| {
        if current.is_empty() {
            return;
        }
        if in_group {
            elements.push(parse_group(current));
        } else {
            elements.push(CliArgElement::Literal(std::mem::take(current)));
        }
        current.clear();
    };

    for ch in raw.chars() {
        match ch {
            '{' => {
                if depth == 0 {
                    push_current(&mut current, in_group, &mut elements);
                    in_group = true;
                }
                depth += 1;
            }
            '}' => {
                if depth == 0 {
                    return Err(ConfigError::UnbalancedBraces(raw.to_string()));
                }
                depth -= 1;
                if depth == 0 {
                    push_current(&mut current, in_group, &mut elements);
                    in_group = false;
                }
            }
            c if c.is_whitespace() && depth == 0 => {
                push_current(&mut current, in_group, &mut elements);
            }
            c => current.push(c),
        }
    }
    if depth != 0 {
        return Err(ConfigError::UnbalancedBraces(raw.to_string()));
    }
    push_current(&mut current, in_group, &mut elements);
    Ok(elements)
}

fn parse_group(inner: &str) -> CliArgElement {
    match inner.split_once(char::is_whitespace) {
        Some((option, name)) => CliArgElement::DataRef {
            name: name.trim().to_string(),
            option: Some(option.trim().to_string()),
        },
        None => CliArgElement::DataRef {
            name: inner.trim().to_string(),
            option: None,
        },
    }
}

/// The discriminant selecting which runtime `Task` variant a declaration
/// builds into. Resolution from the raw `plugin:` string happens in the
/// workflow builder via the plugin registry, not here — the configuration
/// layer only checks that a plugin name was given at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    Shell,
    Icon,
}

/// A single `inputs:`/`wait_on:` reference nested under a cycle's task-ref.
pub type WaitOnSpec = ReferenceSpec;

/// One task-ref entry inside a cycle: which task, and how its inputs,
/// outputs, and wait-on targets are named.
#[derive(Clone, Debug, Default)]
pub struct CycleTaskRef {
    pub name: String,
    pub inputs: Vec<ReferenceSpec>,
    pub outputs: Vec<ReferenceSpec>,
    pub wait_on: Vec<WaitOnSpec>,
}

/// A declared task, after `ROOT` defaults have been merged in. `plugin` is
/// kept as the raw declared string; the workflow builder resolves it to a
/// [`PluginKind`] through the plugin registry during pass 3.
#[derive(Clone, Debug)]
pub struct TaskDecl {
    pub name: String,
    pub plugin: String,
    pub parameters: Vec<String>,
    pub command: Option<String>,
    pub host: Option<String>,
    pub account: Option<String>,
    pub uenv: Option<String>,
    pub nodes: Option<u32>,
    pub walltime: Option<String>,
    pub env_source_files: Vec<String>,
    pub cli_arguments: Option<Vec<CliArgElement>>,
    pub namelists: Vec<String>,
}

#[derive(Clone, Debug, Default)]
struct RawTaskSpec {
    plugin: Option<String>,
    parameters: Vec<String>,
    command: Option<String>,
    host: Option<String>,
    account: Option<String>,
    uenv: Option<String>,
    nodes: Option<u32>,
    walltime: Option<String>,
    env_source_files: Vec<String>,
    cli_arguments: Option<String>,
    namelists: Vec<String>,
}

fn expand_env(raw: &str) -> String {
    shellexpand_env(raw)
}

/// Minimal `$VAR`/`${VAR}` expansion against the process environment. Unknown
/// variables are left untouched rather than erroring, matching the source's
/// `os.path.expandvars` behavior.
fn shellexpand_env(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.char_indices().peekable();
    while let Some((_, ch)) = chars.next() {
        if ch != '$' {
            out.push(ch);
            continue;
        }
        let rest = &raw[chars.peek().map(|(i, _)| *i).unwrap_or(raw.len())..];
        if let Some(stripped) = rest.strip_prefix('{') {
            if let Some(end) = stripped.find('}') {
                let name = &stripped[..end];
                match std::env::var(name) {
                    Ok(val) => out.push_str(&val),
                    Err(_) => {
                        out.push('$');
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                for _ in 0..(name.len() + 2) {
                    chars.next();
                }
                continue;
            }
        }
        let name_len = rest.chars().take_while(|c| c.is_alphanumeric() || *c == '_').count();
        if name_len > 0 {
            let name = &rest[..name_len];
            match std::env::var(name) {
                Ok(val) => out.push_str(&val),
                Err(_) => {
                    out.push('$');
                    out.push_str(name);
                }
            }
            for _ in 0..name_len {
                chars.next();
            }
        } else {
            out.push('$');
        }
    }
    out
}

fn parse_raw_task(context: &str, value: &Value) -> Result<RawTaskSpec> {
    let mut raw = RawTaskSpec::default();
    if value.is_null() {
        return Ok(raw);
    }
    let map = value.as_mapping().ok_or_else(|| ConfigError::WrongShape {
        context: context.to_string(),
        expected: "mapping",
        found: format!("{value:?}"),
    })?;
    for (k, v) in map {
        let key = k.as_str().unwrap_or_default();
        match key {
            "plugin" => raw.plugin = v.as_str().map(str::to_string),
            "parameters" => {
                raw.parameters = as_list(v)
                    .iter()
                    .map(|item| item.as_str().unwrap_or_default().to_string())
                    .collect();
            }
            "command" => raw.command = v.as_str().map(expand_env),
            "host" => raw.host = v.as_str().map(str::to_string),
            "account" => raw.account = v.as_str().map(str::to_string),
            "uenv" => raw.uenv = v.as_str().map(str::to_string),
            "nodes" => raw.nodes = v.as_u64().map(|n| n as u32),
            "walltime" => raw.walltime = v.as_str().map(str::to_string),
            "env_source_files" => {
                raw.env_source_files = as_list(v)
                    .iter()
                    .map(|item| expand_env(item.as_str().unwrap_or_default()))
                    .collect();
            }
            "cli_arguments" => raw.cli_arguments = v.as_str().map(expand_env),
            "namelists" => {
                raw.namelists = as_list(v)
                    .iter()
                    .map(|item| item.as_str().unwrap_or_default().to_string())
                    .collect();
            }
            other => {
                return Err(ConfigError::Invalid {
                    context: context.to_string(),
                    message: format!("unknown task key \"{other}\""),
                })
            }
        }
    }
    Ok(raw)
}

/// Merges `ROOT`'s declared defaults into one sibling task's raw spec,
/// field-by-field, skipping any field the sibling already set. This clones
/// and builds a fresh record rather than mutating the sibling in place.
fn merge_root_defaults(root: &RawTaskSpec, sibling: RawTaskSpec) -> RawTaskSpec {
    RawTaskSpec {
        plugin: sibling.plugin.or_else(|| root.plugin.clone()),
        parameters: if sibling.parameters.is_empty() {
            root.parameters.clone()
        } else {
            sibling.parameters
        },
        command: sibling.command.or_else(|| root.command.clone()),
        host: sibling.host.or_else(|| root.host.clone()),
        account: sibling.account.or_else(|| root.account.clone()),
        uenv: sibling.uenv.or_else(|| root.uenv.clone()),
        nodes: sibling.nodes.or(root.nodes),
        walltime: sibling.walltime.or_else(|| root.walltime.clone()),
        env_source_files: if sibling.env_source_files.is_empty() {
            root.env_source_files.clone()
        } else {
            sibling.env_source_files
        },
        cli_arguments: sibling.cli_arguments.or_else(|| root.cli_arguments.clone()),
        namelists: if sibling.namelists.is_empty() {
            root.namelists.clone()
        } else {
            sibling.namelists
        },
    }
}

fn finalize_task(name: String, raw: RawTaskSpec) -> Result<TaskDecl> {
    let context = format!("task \"{name}\"");
    let plugin = raw.plugin.ok_or_else(|| ConfigError::MissingField {
        context: context.clone(),
        field: "plugin".to_string(),
    })?;
    let cli_arguments = match &raw.cli_arguments {
        Some(s) => Some(parse_cli_arguments(s)?),
        None => None,
    };
    Ok(TaskDecl {
        name,
        plugin,
        parameters: raw.parameters,
        command: raw.command,
        host: raw.host,
        account: raw.account,
        uenv: raw.uenv,
        nodes: raw.nodes,
        walltime: raw.walltime,
        env_source_files: raw.env_source_files,
        cli_arguments,
        namelists: raw.namelists,
    })
}

/// `type: file|dir` declarations under `data: {available, generated}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    File,
    Dir,
}

#[derive(Clone, Debug)]
pub struct DataDecl {
    pub name: String,
    pub kind: DataKind,
    pub src: String,
    pub available: bool,
    pub parameters: Vec<String>,
}

fn parse_data_decl(name: String, value: &Value, available: bool) -> Result<DataDecl> {
    let context = format!("data \"{name}\"");
    let map = value.as_mapping().ok_or_else(|| ConfigError::WrongShape {
        context: context.clone(),
        expected: "mapping",
        found: format!("{value:?}"),
    })?;
    let mut kind = None;
    let mut src = None;
    let mut parameters = Vec::new();
    for (k, v) in map {
        match k.as_str().unwrap_or_default() {
            "type" => {
                let raw = v.as_str().ok_or_else(|| ConfigError::WrongShape {
                    context: context.clone(),
                    expected: "\"file\" or \"dir\"",
                    found: format!("{v:?}"),
                })?;
                kind = Some(match raw {
                    "file" => DataKind::File,
                    "dir" => DataKind::Dir,
                    other => {
                        return Err(ConfigError::Invalid {
                            context: context.clone(),
                            message: format!("data type must be \"file\" or \"dir\", got \"{other}\""),
                        })
                    }
                });
            }
            "src" => src = v.as_str().map(expand_env),
            "format" => {}
            "parameters" => {
                parameters = as_list(v)
                    .iter()
                    .map(|item| item.as_str().unwrap_or_default().to_string())
                    .collect();
            }
            other => {
                return Err(ConfigError::Invalid {
                    context: context.clone(),
                    message: format!("unknown data key \"{other}\""),
                })
            }
        }
    }
    Ok(DataDecl {
        name,
        kind: kind.ok_or_else(|| ConfigError::MissingField {
            context: context.clone(),
            field: "type".to_string(),
        })?,
        src: src.ok_or_else(|| ConfigError::MissingField {
            context,
            field: "src".to_string(),
        })?,
        available,
        parameters,
    })
}

#[derive(Clone, Debug)]
pub struct CycleDecl {
    pub name: String,
    pub start_date: Date,
    pub end_date: Date,
    pub period: Option<IsoDuration>,
    pub tasks: Vec<CycleTaskRef>,
}

fn parse_cycle_task_ref(context: &str, name: String, value: &Value) -> Result<CycleTaskRef> {
    let mut task_ref = CycleTaskRef {
        name,
        ..Default::default()
    };
    if value.is_null() {
        return Ok(task_ref);
    }
    let map = value.as_mapping().ok_or_else(|| ConfigError::WrongShape {
        context: context.to_string(),
        expected: "mapping",
        found: format!("{value:?}"),
    })?;
    for (k, v) in map {
        match k.as_str().unwrap_or_default() {
            "inputs" => {
                for item in as_list(v) {
                    task_ref.inputs.push(parse_reference(context, &item)?);
                }
            }
            "outputs" => {
                for item in as_list(v) {
                    task_ref.outputs.push(parse_reference(context, &item)?);
                }
            }
            "wait_on" => {
                for item in as_list(v) {
                    task_ref.wait_on.push(parse_reference(context, &item)?);
                }
            }
            other => {
                return Err(ConfigError::Invalid {
                    context: context.to_string(),
                    message: format!("unknown cycle task key \"{other}\""),
                })
            }
        }
    }
    Ok(task_ref)
}

fn parse_cycle_decl(name: String, value: &Value) -> Result<CycleDecl> {
    let context = format!("cycle \"{name}\"");
    let map = value.as_mapping().ok_or_else(|| ConfigError::WrongShape {
        context: context.clone(),
        expected: "mapping",
        found: format!("{value:?}"),
    })?;
    let mut start_date = None;
    let mut end_date = None;
    let mut period = None;
    let mut tasks = Vec::new();
    for (k, v) in map {
        match k.as_str().unwrap_or_default() {
            "start_date" => {
                start_date = Some(temporal::parse_date(v.as_str().ok_or_else(|| ConfigError::WrongShape {
                    context: context.clone(),
                    expected: "date string",
                    found: format!("{v:?}"),
                })?)?);
            }
            "end_date" => {
                end_date = Some(temporal::parse_date(v.as_str().ok_or_else(|| ConfigError::WrongShape {
                    context: context.clone(),
                    expected: "date string",
                    found: format!("{v:?}"),
                })?)?);
            }
            "period" => {
                let raw = v.as_str().ok_or_else(|| ConfigError::WrongShape {
                    context: context.clone(),
                    expected: "duration string",
                    found: format!("{v:?}"),
                })?;
                period = Some(temporal::parse_duration(raw)?);
            }
            "tasks" => {
                for item in as_list(v) {
                    let item_map = item.as_mapping().ok_or_else(|| ConfigError::WrongShape {
                        context: context.clone(),
                        expected: "one-key mapping",
                        found: format!("{item:?}"),
                    })?;
                    if item_map.len() != 1 {
                        return Err(ConfigError::WrongShape {
                            context: context.clone(),
                            expected: "exactly one key",
                            found: format!("{} keys", item_map.len()),
                        });
                    }
                    let (task_name, task_spec) = item_map.iter().next().expect("checked len == 1");
                    let task_name = task_name
                        .as_str()
                        .ok_or_else(|| ConfigError::WrongShape {
                            context: context.clone(),
                            expected: "string key",
                            found: format!("{task_name:?}"),
                        })?
                        .to_string();
                    tasks.push(parse_cycle_task_ref(&context, task_name, task_spec)?);
                }
            }
            other => {
                return Err(ConfigError::Invalid {
                    context: context.clone(),
                    message: format!("unknown cycle key \"{other}\""),
                })
            }
        }
    }
    let start_date = start_date.ok_or_else(|| ConfigError::MissingField {
        context: context.clone(),
        field: "start_date".to_string(),
    })?;
    let end_date = end_date.ok_or_else(|| ConfigError::MissingField {
        context: context.clone(),
        field: "end_date".to_string(),
    })?;
    if start_date > end_date {
        return Err(ConfigError::CycleDateOrder {
            name,
            start: start_date.to_string(),
            end: end_date.to_string(),
        });
    }
    if let Some(p) = period {
        if p.is_non_positive() {
            return Err(ConfigError::NonPositivePeriod {
                name,
                period: p.to_string(),
            });
        }
    }
    Ok(CycleDecl {
        name,
        start_date,
        end_date,
        period,
        tasks,
    })
}

/// The fully validated configuration: everything `Workflow::build` needs.
#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub name: String,
    pub parameters: IndexMap<String, ParamDecl>,
    pub tasks: Vec<TaskDecl>,
    pub available_data: Vec<DataDecl>,
    pub generated_data: Vec<DataDecl>,
    pub cycles: Vec<CycleDecl>,
}

impl WorkflowConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(raw)?;
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self> {
        let map = value.as_mapping().ok_or_else(|| ConfigError::WrongShape {
            context: "workflow".to_string(),
            expected: "mapping",
            found: format!("{value:?}"),
        })?;

        let mut name = "workflow".to_string();
        let mut parameters = IndexMap::new();
        let mut raw_tasks: IndexMap<String, Value> = IndexMap::new();
        let mut available_data = Vec::new();
        let mut generated_data = Vec::new();
        let mut cycles = Vec::new();

        for (k, v) in map {
            match k.as_str().unwrap_or_default() {
                "name" => name = v.as_str().unwrap_or("workflow").to_string(),
                "parameters" => {
                    let pmap = v.as_mapping().ok_or_else(|| ConfigError::WrongShape {
                        context: "parameters".to_string(),
                        expected: "mapping",
                        found: format!("{v:?}"),
                    })?;
                    for (pk, pv) in pmap {
                        let pname = pk.as_str().unwrap_or_default().to_string();
                        let values = as_list(pv)
                            .iter()
                            .map(|item| value_to_param(&format!("parameters.{pname}"), item))
                            .collect::<Result<Vec<_>>>()?;
                        parameters.insert(pname.clone(), ParamDecl { name: pname, values });
                    }
                }
                "tasks" => {
                    for item in as_list(v) {
                        let item_map = item.as_mapping().ok_or_else(|| ConfigError::WrongShape {
                            context: "tasks".to_string(),
                            expected: "one-key mapping",
                            found: format!("{item:?}"),
                        })?;
                        if item_map.len() != 1 {
                            return Err(ConfigError::WrongShape {
                                context: "tasks".to_string(),
                                expected: "exactly one key",
                                found: format!("{} keys", item_map.len()),
                            });
                        }
                        let (task_name, task_spec) = item_map.iter().next().expect("checked len == 1");
                        let task_name = task_name
                            .as_str()
                            .ok_or_else(|| ConfigError::WrongShape {
                                context: "tasks".to_string(),
                                expected: "string key",
                                found: format!("{task_name:?}"),
                            })?
                            .to_string();
                        raw_tasks.insert(task_name, task_spec.clone());
                    }
                }
                "data" => {
                    let dmap = v.as_mapping().ok_or_else(|| ConfigError::WrongShape {
                        context: "data".to_string(),
                        expected: "mapping",
                        found: format!("{v:?}"),
                    })?;
                    for (dk, dv) in dmap {
                        let bucket = dk.as_str().unwrap_or_default();
                        let is_available = match bucket {
                            "available" => true,
                            "generated" => false,
                            other => {
                                return Err(ConfigError::Invalid {
                                    context: "data".to_string(),
                                    message: format!("unknown data bucket \"{other}\""),
                                })
                            }
                        };
                        for item in as_list(dv) {
                            let item_map = item.as_mapping().ok_or_else(|| ConfigError::WrongShape {
                                context: "data".to_string(),
                                expected: "one-key mapping",
                                found: format!("{item:?}"),
                            })?;
                            if item_map.len() != 1 {
                                return Err(ConfigError::WrongShape {
                                    context: "data".to_string(),
                                    expected: "exactly one key",
                                    found: format!("{} keys", item_map.len()),
                                });
                            }
                            let (data_name, data_spec) = item_map.iter().next().expect("checked len == 1");
                            let data_name = data_name
                                .as_str()
                                .ok_or_else(|| ConfigError::WrongShape {
                                    context: "data".to_string(),
                                    expected: "string key",
                                    found: format!("{data_name:?}"),
                                })?
                                .to_string();
                            let decl = parse_data_decl(data_name, data_spec, is_available)?;
                            if is_available {
                                available_data.push(decl);
                            } else {
                                generated_data.push(decl);
                            }
                        }
                    }
                }
                "cycles" => {
                    for item in as_list(v) {
                        let item_map = item.as_mapping().ok_or_else(|| ConfigError::WrongShape {
                            context: "cycles".to_string(),
                            expected: "one-key mapping",
                            found: format!("{item:?}"),
                        })?;
                        if item_map.len() != 1 {
                            return Err(ConfigError::WrongShape {
                                context: "cycles".to_string(),
                                expected: "exactly one key",
                                found: format!("{} keys", item_map.len()),
                            });
                        }
                        let (cycle_name, cycle_spec) = item_map.iter().next().expect("checked len == 1");
                        let cycle_name = cycle_name
                            .as_str()
                            .ok_or_else(|| ConfigError::WrongShape {
                                context: "cycles".to_string(),
                                expected: "string key",
                                found: format!("{cycle_name:?}"),
                            })?
                            .to_string();
                        cycles.push(parse_cycle_decl(cycle_name, cycle_spec)?);
                    }
                }
                other => {
                    return Err(ConfigError::Invalid {
                        context: "workflow".to_string(),
                        message: format!("unknown top-level key \"{other}\""),
                    })
                }
            }
        }

        let root_raw = match raw_tasks.shift_remove("ROOT") {
            Some(v) => Some(parse_raw_task("task \"ROOT\"", &v)?),
            None => None,
        };

        let mut tasks = Vec::with_capacity(raw_tasks.len());
        for (name, value) in raw_tasks {
            let raw = parse_raw_task(&format!("task \"{name}\""), &value)?;
            let merged = match &root_raw {
                Some(root) => merge_root_defaults(root, raw),
                None => raw,
            };
            tasks.push(finalize_task(name, merged)?);
        }

        validate_declared_parameters(&parameters, &tasks, &available_data, &generated_data)?;

        Ok(WorkflowConfig {
            name,
            parameters,
            tasks,
            available_data,
            generated_data,
            cycles,
        })
    }
}

/// Every parameter a task or data declaration cycles over must be declared
/// at the workflow level. Checked here, once, over every declaration —
/// independent of whether a cycle's `tasks:` list actually references the
/// declaration — so a stray `parameters: [typo]` on an unused entry is
/// caught before `Workflow::build` ever runs.
fn validate_declared_parameters(
    parameters: &IndexMap<String, ParamDecl>,
    tasks: &[TaskDecl],
    available_data: &[DataDecl],
    generated_data: &[DataDecl],
) -> Result<()> {
    for task in tasks {
        for name in &task.parameters {
            if !parameters.contains_key(name) {
                return Err(ConfigError::UnknownParameter {
                    context: format!("task \"{}\"", task.name),
                    parameter: name.clone(),
                });
            }
        }
    }
    for decl in available_data.iter().chain(generated_data.iter()) {
        for name in &decl.parameters {
            if !parameters.contains_key(name) {
                return Err(ConfigError::UnknownParameter {
                    context: format!("data \"{}\"", decl.name),
                    parameter: name.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_arguments_splits_literals_and_refs() {
        let elements = parse_cli_arguments("--grid {grid_file} --member {member name} done").unwrap();
        assert_eq!(
            elements,
            vec![
                CliArgElement::Literal("--grid".to_string()),
                CliArgElement::DataRef {
                    name: "grid_file".to_string(),
                    option: None
                },
                CliArgElement::Literal("--member".to_string()),
                CliArgElement::DataRef {
                    name: "name".to_string(),
                    option: Some("member".to_string())
                },
                CliArgElement::Literal("done".to_string()),
            ]
        );
    }

    #[test]
    fn cli_arguments_rejects_unbalanced_braces() {
        assert!(parse_cli_arguments("--grid {grid_file").is_err());
        assert!(parse_cli_arguments("--grid grid_file}").is_err());
    }

    #[test]
    fn reference_mutex_violation() {
        let value: Value = serde_yaml::from_str("restart:\n  lag: P1D\n  date: 2025-01-01\n").unwrap();
        let err = parse_reference("test", &value).unwrap_err();
        assert!(matches!(err, ConfigError::RefMutexViolation(_)));
    }

    #[test]
    fn bare_string_reference() {
        let value: Value = serde_yaml::from_str("\"grid_file\"").unwrap();
        let spec = parse_reference("test", &value).unwrap();
        assert_eq!(spec.name, "grid_file");
        assert!(spec.date.is_empty() && spec.lag.is_empty());
    }

    #[test]
    fn parses_full_workflow() {
        let yaml = r#"
name: demo
parameters:
  member: [a, b]
data:
  available:
    - grid_file: {type: file, src: /data/grid.nc}
  generated:
    - forecast: {type: file, src: out.nc, parameters: [member]}
tasks:
  - preproc: {plugin: shell, command: echo hi}
cycles:
  - main:
      start_date: "2025-01-01"
      end_date: "2025-01-01"
      tasks:
        - preproc:
            inputs: [grid_file]
            outputs: [forecast]
"#;
        let cfg = WorkflowConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.name, "demo");
        assert_eq!(cfg.tasks.len(), 1);
        assert_eq!(cfg.cycles.len(), 1);
        assert_eq!(cfg.available_data.len(), 1);
        assert_eq!(cfg.generated_data.len(), 1);
    }

    #[test]
    fn root_defaults_merge_into_siblings() {
        let yaml = r#"
tasks:
  - ROOT: {plugin: shell, host: daint}
  - preproc: {command: echo hi}
  - postproc: {command: echo bye, host: eiger}
cycles: []
"#;
        let cfg = WorkflowConfig::from_yaml_str(yaml).unwrap();
        let preproc = cfg.tasks.iter().find(|t| t.name == "preproc").unwrap();
        assert_eq!(preproc.host.as_deref(), Some("daint"));
        let postproc = cfg.tasks.iter().find(|t| t.name == "postproc").unwrap();
        assert_eq!(postproc.host.as_deref(), Some("eiger"));
        assert!(cfg.tasks.iter().all(|t| t.name != "ROOT"));
    }

    #[test]
    fn rejects_cycle_with_end_before_start() {
        let yaml = r#"
tasks: []
cycles:
  - bad:
      start_date: "2025-06-01"
      end_date: "2025-01-01"
      tasks: []
"#;
        let err = WorkflowConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::CycleDateOrder { .. }));
    }

    #[test]
    fn unreferenced_data_with_unknown_parameter_is_rejected_at_parse_time() {
        let yaml = r#"
name: demo
parameters:
  member: [a, b]
data:
  generated:
    - forecast: {type: file, src: out.nc, parameters: [nonexistent_param]}
tasks: []
cycles: []
"#;
        let err = WorkflowConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownParameter { .. }));
    }

    #[test]
    fn unreferenced_task_with_unknown_parameter_is_rejected_at_parse_time() {
        let yaml = r#"
name: demo
tasks:
  - t: {plugin: shell, command: echo hi, parameters: [nonexistent_param]}
cycles: []
"#;
        let err = WorkflowConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownParameter { .. }));
    }
}
