//! Node-list shape sniffing.
//!
//! Cluster backends in the wild return the node list in several layouts. Each
//! known layout is a pure parser; [`parse_nodes`] tries them in priority order
//! and returns the first that matches.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Treat an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

/// Ray dashboard node record (`/api/v0/nodes`), also used for the
/// CastRay agent listing which reports measured usage inline.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RayNode {
    /// Empty when the feed omits it; the normalizer synthesizes an id.
    #[serde(default, deserialize_with = "null_as_default")]
    pub node_id: String,

    #[serde(default, alias = "ip_address")]
    pub node_ip: Option<String>,

    #[serde(default, alias = "status")]
    pub state: Option<String>,

    #[serde(default)]
    pub is_head_node: Option<bool>,

    #[serde(default)]
    pub state_message: Option<String>,

    /// Resource name to amount, in feed order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub resources_total: Map<String, Value>,

    #[serde(default)]
    pub cpu_usage: Option<f64>,
    #[serde(default)]
    pub memory_usage: Option<f64>,
    #[serde(default)]
    pub gpu_usage: Option<f64>,

    #[serde(default)]
    pub connection_type: Option<String>,
}

/// Resource totals on an already-normalized record. Memory figures are GiB.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportedResources {
    #[serde(default)]
    pub total_cpu: f64,
    #[serde(default)]
    pub total_memory: f64,
    #[serde(default)]
    pub total_gpu: f64,
    #[serde(default)]
    pub object_store: f64,
}

/// A record some upstream already normalized (`{ id, name, cpu, memory, ... }`).
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportedNode {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default, alias = "ip")]
    pub node_ip: Option<String>,
    #[serde(default)]
    pub is_head_node: Option<bool>,
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub memory: Option<f64>,
    #[serde(default)]
    pub gpu: Option<f64>,
    /// Usually a list of strings; some backends send a task count instead.
    #[serde(default)]
    pub tasks: Option<Value>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub state_message: Option<String>,
    #[serde(default)]
    pub connection_type: Option<String>,
    #[serde(default)]
    pub resources: Option<ReportedResources>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawEntry {
    Reported(ReportedNode),
    Ray(RayNode),
    /// Agent listing record. A missing status means the agent is up.
    Agent(RayNode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `{ "nodes": [ {id, name, cpu, ...} ] }`
    ReportedNodes,
    /// `{ "result": { "result": [ray node, ...] } }`
    NestedResult,
    /// `{ "result": [ray node, ...] }`
    FlatResult,
    /// `{ "nodes": [ray node, ...] }`
    RayNodes,
    /// `[agent record, ...]`
    BareArray,
}

impl Shape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Shape::ReportedNodes => "reported_nodes",
            Shape::NestedResult => "nested_result",
            Shape::FlatResult => "flat_result",
            Shape::RayNodes => "ray_nodes",
            Shape::BareArray => "bare_array",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNodes {
    pub shape: Shape,
    /// Whether the list was found inside a `data` envelope.
    pub enveloped: bool,
    pub entries: Vec<RawEntry>,
}

type ShapeParser = fn(&Value) -> Option<Vec<RawEntry>>;

const PARSERS: &[(Shape, ShapeParser)] = &[
    (Shape::ReportedNodes, reported_nodes),
    (Shape::NestedResult, nested_result),
    (Shape::FlatResult, flat_result),
    (Shape::RayNodes, ray_nodes),
    (Shape::BareArray, bare_array),
];

/// Run the parser chain over `payload`, then over `payload.data` if present.
pub fn parse_nodes(payload: &Value) -> Option<ParsedNodes> {
    if let Some(parsed) = run_chain(payload, false) {
        return Some(parsed);
    }
    let data = payload.get("data")?;
    run_chain(data, true)
}

fn run_chain(payload: &Value, enveloped: bool) -> Option<ParsedNodes> {
    PARSERS.iter().find_map(|(shape, parser)| {
        parser(payload).map(|entries| {
            tracing::debug!(shape = shape.as_str(), enveloped, count = entries.len(), "matched node-list shape");
            ParsedNodes {
                shape: *shape,
                enveloped,
                entries,
            }
        })
    })
}

/// Short human description of a payload that matched no shape.
pub fn describe_payload(payload: &Value) -> String {
    match payload {
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).take(8).collect();
            format!("object with keys [{}]", keys.join(", "))
        }
        Value::Array(items) => format!("array of {} non-node entries", items.len()),
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
    }
}

/// Deserialize each element independently. An array matches when it is empty
/// or at least one element parses; unparseable elements are dropped.
fn entries_from<'a, T, F>(value: &'a Value, wrap: F) -> Option<Vec<RawEntry>>
where
    T: Deserialize<'a>,
    F: Fn(T) -> RawEntry,
{
    let items = value.as_array()?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if let Ok(parsed) = T::deserialize(item) {
            out.push(wrap(parsed));
        }
    }
    if out.is_empty() && !items.is_empty() {
        return None;
    }
    if out.len() < items.len() {
        tracing::warn!(
            parsed = out.len(),
            total = items.len(),
            "dropped node entries that did not fit the matched shape"
        );
    }
    Some(out)
}

fn reported_nodes(payload: &Value) -> Option<Vec<RawEntry>> {
    entries_from(payload.get("nodes")?, RawEntry::Reported)
}

fn nested_result(payload: &Value) -> Option<Vec<RawEntry>> {
    entries_from(payload.get("result")?.get("result")?, RawEntry::Ray)
}

fn flat_result(payload: &Value) -> Option<Vec<RawEntry>> {
    entries_from(payload.get("result")?, RawEntry::Ray)
}

fn ray_nodes(payload: &Value) -> Option<Vec<RawEntry>> {
    entries_from(payload.get("nodes")?, RawEntry::Ray)
}

fn bare_array(payload: &Value) -> Option<Vec<RawEntry>> {
    entries_from(payload, RawEntry::Agent)
}
