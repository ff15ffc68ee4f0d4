//! `classify`: offline capability classification of one endpoint.

use meshbridge_core::capability::{self, BATCH_CHANNEL_ID};
use meshbridge_core::command::{BATCH_METHOD, BATCH_PROTOCOL};
use meshbridge_core::{Capability, CapabilityKind, Direction, EndpointDescriptor};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::{ClassifyArgs, GlobalOpts, OutputFormat};
use crate::output;

/// One channel the endpoint would expose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelRow {
    pub id: String,
    pub protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    pub methods: Vec<String>,
    pub events: Vec<String>,
}

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "Channel")]
    id: String,
    #[tabled(rename = "Protocol")]
    protocol: String,
    #[tabled(rename = "Cluster")]
    cluster: String,
    #[tabled(rename = "Dir")]
    direction: String,
    #[tabled(rename = "Methods")]
    methods: String,
    #[tabled(rename = "Events")]
    events: String,
}

fn to_row(c: &ChannelRow) -> Row {
    Row {
        id: c.id.clone(),
        protocol: c.protocol.clone(),
        cluster: c
            .cluster
            .map_or_else(|| "-".into(), |id| format!("0x{id:04X}")),
        direction: c.direction.map_or_else(|| "-".into(), |d| d.to_string()),
        methods: c.methods.join(", "),
        events: c.events.join(", "),
    }
}

/// Channels for `endpoint`, followed by the batch channel when the
/// capabilities would get one.
pub fn channel_rows(endpoint: &EndpointDescriptor) -> Vec<ChannelRow> {
    let capabilities = capability::classify(endpoint);
    let mut rows: Vec<ChannelRow> = capabilities
        .iter()
        .map(|cap| capability_row(endpoint.endpoint_id, cap))
        .collect();

    let batchable = capabilities
        .iter()
        .any(|c| matches!(c.kind, CapabilityKind::Brightness | CapabilityKind::Color));
    if batchable {
        rows.push(ChannelRow {
            id: BATCH_CHANNEL_ID.into(),
            protocol: BATCH_PROTOCOL.into(),
            cluster: None,
            direction: None,
            methods: vec![BATCH_METHOD.into()],
            events: Vec::new(),
        });
    }
    rows
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

fn capability_row(endpoint_id: u8, cap: &Capability) -> ChannelRow {
    ChannelRow {
        id: cap.channel_id(endpoint_id),
        protocol: cap.kind.protocol().into(),
        cluster: Some(cap.cluster),
        direction: Some(cap.direction),
        methods: owned(cap.kind.methods()),
        events: owned(cap.kind.events()),
    }
}

pub fn handle(args: &ClassifyArgs, global: &GlobalOpts) {
    let endpoint = EndpointDescriptor {
        endpoint_id: args.endpoint,
        profile_id: args.profile,
        device_type: args.device_type,
        input_clusters: args.input_clusters.clone(),
        output_clusters: args.output_clusters.clone(),
    };

    let rows = channel_rows(&endpoint);
    if global.output == OutputFormat::Table {
        let thing = capability::thing_type(&endpoint)
            .map_or_else(|| "unknown".to_owned(), |t| t.to_string());
        eprintln!("thing type: {thing}");
    }
    output::print_output(&output::render_list(
        global.output,
        &rows,
        to_row,
        |c| c.id.clone(),
    ));
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn endpoint(input: &[u16], output: &[u16]) -> EndpointDescriptor {
        EndpointDescriptor {
            endpoint_id: 1,
            profile_id: capability::PROFILE_HOME_AUTOMATION,
            device_type: 0x0101,
            input_clusters: input.to_vec(),
            output_clusters: output.to_vec(),
        }
    }

    fn ids(rows: &[ChannelRow]) -> Vec<&str> {
        rows.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn dimmable_light_gets_batch_row() {
        let rows = channel_rows(&endpoint(&[0x0000, 0x0006, 0x0008], &[]));
        assert_eq!(ids(&rows), vec!["1-6-in", "1-8", "batch"]);
        assert_eq!(rows[1].protocol, "brightness");
        assert_eq!(rows[2].methods, vec!["setBatch"]);
    }

    #[test]
    fn on_off_only_has_no_batch_row() {
        let rows = channel_rows(&endpoint(&[0x0006], &[]));
        assert_eq!(ids(&rows), vec!["1-6-in"]);
    }
}
