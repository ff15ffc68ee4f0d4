#![allow(clippy::unwrap_used)]
// Integration tests for device discovery over the simulated stack.

mod common;

use std::time::Duration;

use meshbridge_api::{IeeeAddress, NwkDeviceInfo, SimDevice, Status};
use meshbridge_core::bus::{SIGNATURE_MANUFACTURER, SIGNATURE_MODEL, SIGNATURE_THING_TYPE};
use meshbridge_core::{BridgeEvent, CapabilityKind, CoreError, DeviceFilter, ThingType};
use pretty_assertions::assert_eq;

use common::{
    LIGHT, RecordingBus, addr, bridge, color_light, dimmable_light, endpoint, plug, quiet_config,
    wait_until,
};

fn info(device: &SimDevice) -> NwkDeviceInfo {
    device.info.clone()
}

// ── Classification on discovery ─────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_dimmable_light_exports_on_off_brightness_and_batch() {
    let stack = meshbridge_api::SimulatedStack::new();
    let bus = RecordingBus::new();
    let bridge = bridge(&stack, &bus, quiet_config());
    bridge.start().await.unwrap();

    stack.join(dimmable_light(LIGHT)).await;
    wait_until(|| bridge.device(addr(LIGHT)).is_some()).await;

    assert_eq!(bus.channel_ids(addr(LIGHT)), vec!["1-6-in", "1-8", "batch"]);

    let on_off = bus.channel(addr(LIGHT), "1-6-in").unwrap();
    assert_eq!(on_off.protocol, "on-off");
    assert_eq!(on_off.methods, vec!["turnOn", "turnOff", "set", "toggle"]);
    assert_eq!(on_off.events, vec!["state"]);

    let batch = bus.channel(addr(LIGHT), "batch").unwrap();
    assert_eq!(batch.protocol, "core/batching");
    assert_eq!(batch.methods, vec!["setBatch"]);

    let record = bridge.device(addr(LIGHT)).unwrap();
    assert!(record.channels_of(CapabilityKind::Color).next().is_none());
    assert_eq!(
        record.batch().unwrap().members(),
        vec![CapabilityKind::OnOff, CapabilityKind::Brightness]
    );
    assert_eq!(record.thing_type(), Some(ThingType::Light));

    bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_device_export_carries_identity() {
    let stack = meshbridge_api::SimulatedStack::new();
    let bus = RecordingBus::new();
    let bridge = bridge(&stack, &bus, quiet_config());
    bridge.start().await.unwrap();

    let device = dimmable_light(LIGHT);
    stack.add_device(device.clone());
    bridge.discover(info(&device)).await.unwrap();

    let exports = bus.devices();
    assert_eq!(exports.len(), 1);
    insta::assert_json_snapshot!(exports[0], @r###"
    {
      "naturalId": "13A20012345678",
      "name": "Dimmer by Acme",
      "signatures": {
        "ninja:thingType": "light",
        "zigbee:ManufacturerName": "Acme",
        "zigbee:ModelIdentifier": "Dimmer"
      }
    }
    "###);

    bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_on_off_only_device_has_no_batch_channel() {
    let stack = meshbridge_api::SimulatedStack::new();
    let bus = RecordingBus::new();
    let bridge = bridge(&stack, &bus, quiet_config());
    bridge.start().await.unwrap();

    let device = plug(0xA1);
    stack.add_device(device.clone());
    let outcome = bridge.discover(info(&device)).await.unwrap();

    assert!(outcome.is_created());
    assert_eq!(bus.channel_ids(addr(0xA1)), vec!["1-6-in", "1-1794"]);
    assert!(outcome.record().batch().is_none());
    assert_eq!(outcome.record().thing_type(), Some(ThingType::Socket));

    bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_multi_endpoint_sensor_and_remote() {
    let stack = meshbridge_api::SimulatedStack::new();
    let bus = RecordingBus::new();
    let bridge = bridge(&stack, &bus, quiet_config());
    bridge.start().await.unwrap();

    let device = SimDevice::new(IeeeAddress(0xB2))
        .identity("Acme", "Multi")
        // Repeated cluster ids collapse to one channel.
        .endpoint(endpoint(1, 0x0302, &[0x0000, 0x0402, 0x0405, 0x0402], &[0x0006]))
        .endpoint(endpoint(2, 0x0402, &[0x0500], &[]));
    stack.add_device(device.clone());
    bridge.discover(info(&device)).await.unwrap();

    assert_eq!(
        bus.channel_ids(addr(0xB2)),
        vec!["1-1026", "1-1029", "1-6-out", "2-1280"]
    );
    let button = bus.channel(addr(0xB2), "1-6-out").unwrap();
    assert_eq!(button.protocol, "button-momentary");
    assert!(button.methods.is_empty());
    assert_eq!(button.events, vec!["pressed"]);
    assert_eq!(bus.channel(addr(0xB2), "2-1280").unwrap().protocol, "presence");

    let record = bridge.device(addr(0xB2)).unwrap();
    assert!(record.batch().is_none());
    assert_eq!(record.thing_type(), Some(ThingType::Sensor));

    bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_color_light_batch_references_all_members() {
    let stack = meshbridge_api::SimulatedStack::new();
    let bus = RecordingBus::new();
    let bridge = bridge(&stack, &bus, quiet_config());
    bridge.start().await.unwrap();

    let device = color_light(0xC3);
    stack.add_device(device.clone());
    let outcome = bridge.discover(info(&device)).await.unwrap();

    assert_eq!(
        bus.channel_ids(addr(0xC3)),
        vec!["11-6-in", "11-8", "11-768", "batch"]
    );
    assert_eq!(
        outcome.record().batch().unwrap().members(),
        vec![
            CapabilityKind::OnOff,
            CapabilityKind::Brightness,
            CapabilityKind::Color
        ]
    );

    bridge.shutdown().await;
}

// ── Metadata fallback ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_missing_basic_info_uses_synthetic_identity() {
    let stack = meshbridge_api::SimulatedStack::new();
    let bus = RecordingBus::new();
    let bridge = bridge(&stack, &bus, quiet_config());
    bridge.start().await.unwrap();

    let device = SimDevice::new(IeeeAddress(LIGHT))
        .endpoint(endpoint(1, 0x0101, &[0x0000, 0x0006, 0x0008], &[]));
    stack.add_device(device.clone());
    let outcome = bridge.discover(info(&device)).await.unwrap();

    let record = outcome.record();
    assert_eq!(record.name(), "MAC:13A20012345678 by Unknown");
    assert_eq!(record.manufacturer(), "Unknown");

    let export = &bus.devices()[0];
    assert!(!export.signatures.contains_key(SIGNATURE_MANUFACTURER));
    assert!(!export.signatures.contains_key(SIGNATURE_MODEL));
    assert_eq!(
        export.signatures.get(SIGNATURE_THING_TYPE).map(String::as_str),
        Some("light")
    );
    // Discovery still completes.
    assert_eq!(bus.channel_ids(addr(LIGHT)), vec!["1-6-in", "1-8", "batch"]);

    bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_blank_basic_info_counts_as_missing() {
    let stack = meshbridge_api::SimulatedStack::new();
    let bus = RecordingBus::new();
    let bridge = bridge(&stack, &bus, quiet_config());
    bridge.start().await.unwrap();

    let device = dimmable_light(LIGHT).identity("", "");
    stack.add_device(device.clone());
    let outcome = bridge.discover(info(&device)).await.unwrap();

    let record = outcome.record();
    assert_eq!(record.name(), "MAC:13A20012345678 by Unknown");
    assert_eq!(record.model(), "MAC:13A20012345678");

    let export = &bus.devices()[0];
    assert!(!export.signatures.contains_key(SIGNATURE_MANUFACTURER));
    assert!(!export.signatures.contains_key(SIGNATURE_MODEL));

    bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unresponsive_device_is_still_registered() {
    let stack = meshbridge_api::SimulatedStack::new();
    let bus = RecordingBus::new();
    let bridge = bridge(&stack, &bus, quiet_config());
    bridge.start().await.unwrap();

    let device = plug(0xD4).unresponsive();
    stack.add_device(device.clone());
    let outcome = bridge.discover(info(&device)).await.unwrap();

    assert_eq!(outcome.record().name(), "MAC:D4 by Unknown");
    assert_eq!(bus.channel_ids(addr(0xD4)), vec!["1-6-in", "1-1794"]);
    assert_eq!(bridge.devices_found(), 1);

    bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reporting_failure_does_not_block_export() {
    let stack = meshbridge_api::SimulatedStack::new();
    let bus = RecordingBus::new();
    let bridge = bridge(&stack, &bus, quiet_config());
    bridge.start().await.unwrap();

    let device = plug(0xD5).without_reporting();
    stack.add_device(device.clone());
    bridge.discover(info(&device)).await.unwrap();

    assert_eq!(bus.channel_ids(addr(0xD5)), vec!["1-6-in", "1-1794"]);
    let record = bridge.device(addr(0xD5)).unwrap();
    assert!(
        record
            .channels()
            .iter()
            .all(|c| c.lifecycle() == meshbridge_core::Lifecycle::Active)
    );

    bridge.shutdown().await;
}

// ── Export failures ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_device_export_failure_aborts_discovery() {
    let stack = meshbridge_api::SimulatedStack::new();
    let bus = RecordingBus::new();
    bus.fail_device_exports();
    let bridge = bridge(&stack, &bus, quiet_config());
    bridge.start().await.unwrap();

    let device = dimmable_light(LIGHT);
    stack.add_device(device.clone());
    let err = bridge.discover(info(&device)).await.unwrap_err();

    assert!(matches!(err, CoreError::Bus { .. }), "got: {err:?}");
    assert!(bridge.device(addr(LIGHT)).is_none());
    assert_eq!(bridge.devices_found(), 0);
    assert!(bus.channel_ids(addr(LIGHT)).is_empty());

    bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_channel_export_failure_skips_channel() {
    let stack = meshbridge_api::SimulatedStack::new();
    let bus = RecordingBus::new();
    bus.fail_channel_export("1-8");
    let bridge = bridge(&stack, &bus, quiet_config());
    bridge.start().await.unwrap();

    let device = dimmable_light(LIGHT);
    stack.add_device(device.clone());
    let outcome = bridge.discover(info(&device)).await.unwrap();

    // Without brightness there is nothing to batch.
    assert_eq!(bus.channel_ids(addr(LIGHT)), vec!["1-6-in"]);
    assert_eq!(outcome.record().channels().len(), 1);
    assert!(outcome.record().batch().is_none());

    bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_batch_export_failure_keeps_device() {
    let stack = meshbridge_api::SimulatedStack::new();
    let bus = RecordingBus::new();
    bus.fail_channel_export("batch");
    let bridge = bridge(&stack, &bus, quiet_config());
    bridge.start().await.unwrap();

    let device = dimmable_light(LIGHT);
    stack.add_device(device.clone());
    let outcome = bridge.discover(info(&device)).await.unwrap();

    assert_eq!(bus.channel_ids(addr(LIGHT)), vec!["1-6-in", "1-8"]);
    assert!(outcome.record().batch().is_none());

    bridge.shutdown().await;
}

// ── Rediscovery ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_rediscovery_does_not_duplicate() {
    let stack = meshbridge_api::SimulatedStack::new();
    let bus = RecordingBus::new();
    let bridge = bridge(&stack, &bus, quiet_config());
    bridge.start().await.unwrap();

    stack.join(dimmable_light(LIGHT)).await;
    wait_until(|| bridge.device(addr(LIGHT)).is_some()).await;

    assert!(stack.announce(IeeeAddress(LIGHT)).await);
    wait_until(|| {
        bus.bridge_events()
            .contains(&BridgeEvent::DeviceRediscovered { address: addr(LIGHT) })
    })
    .await;

    assert_eq!(bridge.registry().len(), 1);
    assert_eq!(bridge.devices_found(), 1);
    assert_eq!(bus.devices().len(), 1);
    assert_eq!(bus.channel_ids(addr(LIGHT)), vec!["1-6-in", "1-8", "batch"]);

    bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_announcements_create_one_record() {
    let stack = meshbridge_api::SimulatedStack::new();
    let bus = RecordingBus::new();
    let bridge = bridge(&stack, &bus, quiet_config());
    bridge.start().await.unwrap();

    let device = dimmable_light(LIGHT);
    stack.add_device(device.clone());
    let (first, second) = tokio::join!(
        bridge.discover(info(&device)),
        bridge.discover(info(&device))
    );

    let created = [first.unwrap(), second.unwrap()]
        .iter()
        .filter(|o| o.is_created())
        .count();
    assert_eq!(created, 1);
    assert_eq!(bridge.devices_found(), 1);
    assert_eq!(bus.devices().len(), 1);

    bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_rediscovery_refreshes_endpoints_only() {
    let stack = meshbridge_api::SimulatedStack::new();
    let bus = RecordingBus::new();
    let bridge = bridge(&stack, &bus, quiet_config());
    bridge.start().await.unwrap();

    let device = dimmable_light(LIGHT);
    stack.add_device(device.clone());
    bridge.discover(info(&device)).await.unwrap();
    let before = bridge.device(addr(LIGHT)).unwrap();

    let upgraded = endpoint(1, 0x0102, &[0x0000, 0x0006, 0x0008, 0x0300], &[]);
    stack.set_endpoints(IeeeAddress(LIGHT), vec![upgraded.clone()]);
    let mut updated = info(&device);
    updated.simple_descriptors = vec![upgraded];
    let outcome = bridge.discover(updated).await.unwrap();

    assert!(!outcome.is_created());
    let after = outcome.record();
    assert_eq!(after.endpoints()[0].input_clusters, vec![0x0000, 0x0006, 0x0008, 0x0300]);
    // No color channel appears; existing channels see the new descriptor.
    assert_eq!(after.channels().len(), 2);
    assert_eq!(after.channels()[0].endpoint().device_type, 0x0102);
    assert_eq!(after.discovered_at(), before.discovered_at());
    assert_eq!(bus.channel_ids(addr(LIGHT)), vec!["1-6-in", "1-8", "batch"]);

    bridge.shutdown().await;
}

// ── Device list on start ────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_start_fetches_known_devices() {
    let stack = meshbridge_api::SimulatedStack::new();
    stack.add_device(dimmable_light(LIGHT));
    stack.add_device(plug(0xA1));

    let bus = RecordingBus::new();
    let config = meshbridge_core::BridgeConfig {
        fetch_devices_on_start: true,
        ..quiet_config()
    };
    let bridge = bridge(&stack, &bus, config);
    bridge.start().await.unwrap();

    wait_until(|| bridge.registry().len() == 2).await;
    let lights = bridge
        .devices()
        .matching(&DeviceFilter::ByThingType(ThingType::Light));
    assert_eq!(lights.len(), 1);
    assert_eq!(lights[0].natural_id(), "13A20012345678");
    assert_eq!(
        bridge
            .devices()
            .matching(&DeviceFilter::WithCapability(CapabilityKind::Power))
            .len(),
        1
    );

    bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_device_stream_sees_new_devices() {
    let stack = meshbridge_api::SimulatedStack::new();
    let bus = RecordingBus::new();
    let bridge = bridge(&stack, &bus, quiet_config());
    bridge.start().await.unwrap();

    let mut devices = bridge.devices();
    assert!(devices.current().is_empty());

    stack.join(plug(0xA1)).await;
    let snapshot = tokio::time::timeout(Duration::from_secs(60), devices.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.len(), 1);
    assert!(devices.find(addr(0xA1)).is_some());

    bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_discover_after_shutdown_is_refused() {
    let stack = meshbridge_api::SimulatedStack::new();
    let bus = RecordingBus::new();
    let bridge = bridge(&stack, &bus, quiet_config());
    bridge.start().await.unwrap();
    bridge.shutdown().await;

    let device = plug(0xA1).reject("ReadAttributes", Status::Failure);
    stack.add_device(device.clone());
    let err = bridge.discover(info(&device)).await.unwrap_err();
    assert!(matches!(err, CoreError::ShuttingDown));
    assert!(bridge.start().await.is_err());
}
