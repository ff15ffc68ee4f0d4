//! `simulate`: run the bridge over the in-memory mesh.
//!
//! Bus traffic goes to stdout as JSON lines, inbound calls come from stdin,
//! logs go to stderr.

use std::sync::Arc;
use std::time::Duration;

use meshbridge_api::{IeeeAddress, SimDevice, SimpleDescriptor, SimulatedStack, cluster};
use meshbridge_config::Config;
use meshbridge_core::capability::PROFILE_HOME_AUTOMATION;
use meshbridge_core::{Bridge, CapabilityBus};
use tokio::io::BufReader;
use tracing::info;

use crate::cli::SimulateArgs;
use crate::error::CliError;
use crate::stable;
use crate::stdio_bus::StdioBus;

pub async fn handle(args: SimulateArgs, mut config: Config) -> Result<(), CliError> {
    apply_overrides(&mut config, &args);
    config.validate()?;

    if let Some(path) = &config.stable_flag_file {
        let timeout = args.stable_timeout.map(Duration::from_secs);
        stable::wait_for_flag(path, stable::POLL_INTERVAL, timeout).await?;
    }

    let stack = SimulatedStack::new();
    let mut seeds = config.sim_devices()?;
    if args.demo {
        seeds.extend(demo_devices());
    }
    let seeded = seeds.len();
    for device in seeds {
        stack.add_device(device);
    }

    info!(
        host = %config.network.host,
        gateway_port = config.network.gateway_port,
        nwkmgr_port = config.network.nwkmgr_port,
        ota_port = config.network.ota_port,
        devices = seeded,
        "starting bridge over simulated network stack"
    );

    let bus = Arc::new(StdioBus::new(tokio::io::stdout()));
    let bridge = Bridge::new(
        Arc::new(stack),
        Arc::clone(&bus) as Arc<dyn CapabilityBus>,
        config.bridge_config(),
    );
    bridge.start().await?;

    let inbound = tokio::spawn(
        Arc::clone(&bus).serve(BufReader::new(tokio::io::stdin()), bridge.cancellation()),
    );

    wait_for_exit(args.run_for).await;

    info!("shutting down");
    bridge.shutdown().await;
    inbound.abort();
    Ok(())
}

fn apply_overrides(config: &mut Config, args: &SimulateArgs) {
    if let Some(host) = &args.host {
        config.network.host.clone_from(host);
    }
    if let Some(path) = &args.stable_flag_file {
        config.stable_flag_file = Some(path.clone());
    }
    if let Some(secs) = args.join_secs {
        config.bridge.join_on_start_secs = secs;
    }
}

async fn wait_for_exit(run_for: Option<u64>) {
    let deadline = async {
        match run_for {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
        () = deadline => {}
    }
}

// ── Demo network ────────────────────────────────────────────────────

fn endpoint(id: u8, device_id: u16, input: &[u16], output: &[u16]) -> SimpleDescriptor {
    SimpleDescriptor {
        endpoint_id: id,
        profile_id: PROFILE_HOME_AUTOMATION,
        device_id,
        input_clusters: input.to_vec(),
        output_clusters: output.to_vec(),
    }
}

/// A small mixed network: two lights, a metering plug, a climate sensor.
pub fn demo_devices() -> Vec<SimDevice> {
    vec![
        SimDevice::new(IeeeAddress(0x0013_A200_1234_5678))
            .identity("Acme", "Dimmer")
            .endpoint(endpoint(
                1,
                0x0101,
                &[cluster::BASIC, cluster::ON_OFF, cluster::LEVEL_CONTROL],
                &[],
            )),
        SimDevice::new(IeeeAddress(0x0013_A200_1234_5679))
            .identity("Acme", "Color")
            .endpoint(endpoint(
                11,
                0x0102,
                &[
                    cluster::BASIC,
                    cluster::ON_OFF,
                    cluster::LEVEL_CONTROL,
                    cluster::COLOR_CONTROL,
                ],
                &[],
            )),
        SimDevice::new(IeeeAddress(0x0013_A200_0000_0A01))
            .identity("Acme", "Plug")
            .endpoint(endpoint(
                1,
                0x0051,
                &[cluster::BASIC, cluster::ON_OFF, cluster::SIMPLE_METERING],
                &[],
            )),
        SimDevice::new(IeeeAddress(0x0013_A200_0000_0B01))
            .identity("Acme", "Climate")
            .endpoint(endpoint(
                1,
                0x0302,
                &[
                    cluster::BASIC,
                    cluster::TEMPERATURE_MEASUREMENT,
                    cluster::RELATIVE_HUMIDITY,
                ],
                &[],
            )),
    ]
}
