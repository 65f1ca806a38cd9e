//! In-memory endpoint graph shared by the backends.
//!
//! Segments and endpoints get sequential ids starting at 1. The graph is
//! rendered into a launcher command script by [`Registry::render_commands`].

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::backend::{Edge, Endpoint, EndpointId, SegmentId};
use crate::error::{BackendError, BackendResult};

/// Endpoint properties rendered as dedicated `vm config` lines for every
/// launch kind; other properties become tags.
const CONFIG_KEYS: &[(&str, &str)] = &[
    ("uuid", "uuid"),
    ("memory", "memory"),
    ("vcpus", "vcpus"),
    ("coschedule", "coschedule"),
];

const KVM_CONFIG_KEYS: &[(&str, &str)] = &[
    ("cpu_model", "cpu"),
    ("smp_sockets", "sockets"),
    ("smp_cores", "cores"),
    ("smp_threads", "threads"),
    ("vga_model", "vga"),
    ("disks", "disk"),
    ("virtio_ports", "virtio-ports"),
    ("qemu_append", "qemu-append"),
];

const CONTAINER_CONFIG_KEYS: &[(&str, &str)] = &[("filesystem", "filesystem")];

/// Properties consumed elsewhere in the script.
const SKIPPED_KEYS: &[&str] = &["name", "power_state", "type"];

const DEFAULT_LAUNCH_KIND: &str = "kvm";

fn kind_config_keys(kind: &str) -> &'static [(&'static str, &'static str)] {
    match kind {
        "container" => CONTAINER_CONFIG_KEYS,
        _ => KVM_CONFIG_KEYS,
    }
}

fn is_config_key(key: &str) -> bool {
    CONFIG_KEYS
        .iter()
        .chain(KVM_CONFIG_KEYS)
        .chain(CONTAINER_CONFIG_KEYS)
        .any(|(k, _)| *k == key)
}

#[derive(Debug, Default)]
pub struct Registry {
    next_segment: u64,
    next_endpoint: u64,
    segments: Vec<SegmentId>,
    endpoints: BTreeMap<EndpointId, Endpoint>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_network(&mut self) -> SegmentId {
        self.next_segment += 1;
        let id = SegmentId(self.next_segment);
        self.segments.push(id);
        id
    }

    pub fn insert_endpoint(&mut self, properties: BTreeMap<String, String>) -> Endpoint {
        self.next_endpoint += 1;
        let endpoint = Endpoint {
            id: EndpointId(self.next_endpoint),
            properties,
            edges: Vec::new(),
        };
        self.endpoints.insert(endpoint.id, endpoint.clone());
        endpoint
    }

    pub fn connect_endpoint(
        &mut self,
        id: EndpointId,
        segment: SegmentId,
    ) -> BackendResult<Endpoint> {
        if !self.segments.contains(&segment) {
            return Err(BackendError::UnknownSegment(segment.0));
        }
        let endpoint = self
            .endpoints
            .get_mut(&id)
            .ok_or(BackendError::UnknownEndpoint(id.0))?;
        endpoint.edges.push(Edge::new(segment));
        Ok(endpoint.clone())
    }

    pub fn update_endpoint(&mut self, endpoint: Endpoint) -> BackendResult<Endpoint> {
        let stored = self
            .endpoints
            .get_mut(&endpoint.id)
            .ok_or(BackendError::UnknownEndpoint(endpoint.id.0))?;
        if let Some(edge) = endpoint
            .edges
            .iter()
            .find(|e| !self.segments.contains(&e.segment))
        {
            return Err(BackendError::UnknownSegment(edge.segment.0));
        }
        *stored = endpoint;
        Ok(stored.clone())
    }

    pub fn segments(&self) -> &[SegmentId] {
        &self.segments
    }

    pub fn endpoint(&self, id: EndpointId) -> Option<&Endpoint> {
        self.endpoints.get(&id)
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.values()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Render the launcher script that configures, launches and starts
    /// every registered endpoint.
    pub fn render_commands(&self) -> String {
        let mut out = String::new();
        let mut start = Vec::new();
        for endpoint in self.endpoints.values() {
            let name = endpoint
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("endpoint-{}", endpoint.id.0));
            let kind = endpoint
                .properties
                .get("type")
                .map(String::as_str)
                .unwrap_or(DEFAULT_LAUNCH_KIND);
            let _ = writeln!(out, "clear vm config");
            for (key, directive) in CONFIG_KEYS.iter().chain(kind_config_keys(kind)) {
                if let Some(value) = endpoint.properties.get(*key).filter(|v| !v.is_empty()) {
                    let _ = writeln!(out, "vm config {directive} {value}");
                }
            }
            for (key, value) in &endpoint.properties {
                let known = is_config_key(key) || SKIPPED_KEYS.contains(&key.as_str());
                if !known && !value.is_empty() {
                    let _ = writeln!(out, "vm config tags {key} {value}");
                }
            }
            if !endpoint.edges.is_empty() {
                let nets: Vec<String> = endpoint.edges.iter().map(net_spec).collect();
                let _ = writeln!(out, "vm config net {}", nets.join(" "));
            }
            let _ = writeln!(out, "vm launch {kind} {name}");
            for (index, edge) in endpoint.edges.iter().enumerate() {
                for line in qos_lines(&name, index, edge) {
                    let _ = writeln!(out, "{line}");
                }
            }
            if endpoint.properties.get("power_state").map(String::as_str) == Some("running") {
                start.push(name);
            }
        }
        for name in start {
            let _ = writeln!(out, "vm start {name}");
        }
        out
    }
}

/// `bridge,network,mac,driver` with unset parts left out.
fn net_spec(edge: &Edge) -> String {
    let mut parts = Vec::new();
    if let Some(bridge) = edge.attributes.get("bridge") {
        parts.push(bridge.clone());
    }
    parts.push(edge.segment.network_name());
    for key in ["mac", "driver"] {
        if let Some(value) = edge.attributes.get(key) {
            parts.push(value.clone());
        }
    }
    parts.join(",")
}

fn qos_lines(name: &str, index: usize, edge: &Edge) -> Vec<String> {
    let attrs = &edge.attributes;
    let mut lines = Vec::new();
    if let Some(delay) = attrs.get("delay") {
        lines.push(format!("qos add {name} {index} delay {delay}"));
    }
    if let Some(rate) = attrs.get("rate") {
        let unit = attrs.get("unit").map(String::as_str).unwrap_or("mbit");
        lines.push(format!("qos add {name} {index} rate {rate} {unit}"));
    }
    if let Some(loss) = attrs.get("loss") {
        lines.push(format!("qos add {name} {index} loss {loss}"));
    }
    lines
}
