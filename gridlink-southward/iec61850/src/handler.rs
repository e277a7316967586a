use async_trait::async_trait;
use dashmap::DashMap;
use gridlink_core::{gateway::Component, PointStore};
use gridlink_error::GwResult;
use gridlink_models::{
    iec61850_map, Mapping, Point, RecordFlag, SampleRecord, SourceProtocol,
};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Channel-id prefix this adapter owns; everything else belongs to another
/// handler and is skipped silently.
const CHANNEL_PREFIX: &str = "iec61850_";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationSummary {
    pub registered: usize,
    pub skipped: usize,
}

/// Subscribes to 61850 report channels and maps their samples onto the
/// point store. The 61850 client library delivers [`SampleRecord`]s via
/// [`Iec61850InputHandler::on_record`]; device timestamps pass through to
/// the point.
pub struct Iec61850InputHandler {
    store: Arc<PointStore>,
    channels: DashMap<String, Mapping>,
}

impl Iec61850InputHandler {
    pub fn new(store: Arc<PointStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            channels: DashMap::new(),
        })
    }

    /// Attach the mapped subset of the given channel ids. Channels outside
    /// this adapter's prefix are skipped silently; mapped prefix channels
    /// register, unmapped ones are counted and skipped.
    pub fn register_channels<I, S>(&self, channel_ids: I) -> RegistrationSummary
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut summary = RegistrationSummary::default();
        for channel_id in channel_ids {
            let channel_id = channel_id.as_ref();
            if !channel_id.starts_with(CHANNEL_PREFIX) {
                continue; // belongs to another handler
            }
            match iec61850_map().get(channel_id) {
                Some(mapping) => {
                    info!(channel = channel_id, ioa = mapping.ioa, "IEC61850 channel mapped");
                    self.channels
                        .insert(channel_id.to_string(), mapping.clone());
                    summary.registered += 1;
                }
                None => {
                    debug!(channel = channel_id, "Skipping unmapped IEC61850 channel");
                    summary.skipped += 1;
                }
            }
        }
        info!(
            registered = summary.registered,
            skipped = summary.skipped,
            "IEC61850 init complete"
        );
        summary
    }

    /// Ingress callback from the 61850 client library.
    pub fn on_record(&self, channel_id: &str, record: SampleRecord) {
        let Some(mapping) = self.channels.get(channel_id) else {
            return;
        };

        if record.flag != RecordFlag::Valid {
            info!(channel = channel_id, flag = ?record.flag, "Invalid flag, dropping sample");
            return;
        }
        let Some(value) = record.value else {
            trace!(channel = channel_id, "Empty sample");
            return;
        };

        let mut point = Point::new(
            mapping.ioa,
            mapping.common_address,
            mapping.asdu_type,
            value,
            record.timestamp,
            true,
        );
        point.id = channel_id.to_string();
        point.source_protocol = SourceProtocol::Iec61850;
        point.source_address = mapping.description.to_string();
        point.description = mapping.description.to_string();

        debug!(channel = channel_id, ioa = point.ioa, value = %point.value, "IEC61850 sample");
        self.store.update(point);
    }

    pub fn registered_count(&self) -> usize {
        self.channels.len()
    }
}

#[async_trait]
impl Component for Iec61850InputHandler {
    fn name(&self) -> &str {
        "iec61850-input"
    }

    async fn start(&self) -> GwResult<()> {
        info!("Activating IEC 61850 input handler");
        self.register_channels(iec61850_map().keys().copied());
        Ok(())
    }

    async fn stop(&self) -> GwResult<()> {
        let count = self.channels.len();
        self.channels.clear();
        if count > 0 {
            warn!(count, "Detached IEC61850 channels");
        }
        info!("IEC 61850 input handler deactivated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridlink_core::StoreConfig;
    use gridlink_models::Value;

    fn handler() -> (Arc<PointStore>, Arc<Iec61850InputHandler>) {
        let store = PointStore::new(StoreConfig::default());
        let handler = Iec61850InputHandler::new(Arc::clone(&store));
        (store, handler)
    }

    #[test]
    fn registers_only_mapped_prefix_channels() {
        let (_store, handler) = handler();
        let summary = handler.register_channels([
            "iec61850_measurement1",
            "iec61850_measurement2",
            "iec61850_unmapped",
            "modbus_register1",
        ]);
        assert_eq!(summary.registered, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(handler.registered_count(), 2);
    }

    #[test]
    fn valid_record_becomes_point_with_device_time() {
        let (store, handler) = handler();
        handler.register_channels(["iec61850_measurement1"]);

        handler.on_record(
            "iec61850_measurement1",
            SampleRecord::valid(Value::Float64(1.5), 1_738_238_130_123),
        );

        let point = store.get(1001).expect("point stored");
        assert_eq!(point.source_protocol, SourceProtocol::Iec61850);
        assert_eq!(point.id, "iec61850_measurement1");
        assert_eq!(point.timestamp, 1_738_238_130_123);
        assert_eq!(point.as_float().unwrap(), 1.5);
        assert!(point.valid);
    }

    #[test]
    fn invalid_flag_is_dropped() {
        let (store, handler) = handler();
        handler.register_channels(["iec61850_measurement1"]);

        handler.on_record(
            "iec61850_measurement1",
            SampleRecord::flagged(RecordFlag::Disconnected),
        );
        assert!(store.get(1001).is_none());
    }

    #[test]
    fn unregistered_channel_is_ignored() {
        let (store, handler) = handler();
        handler.on_record(
            "iec61850_measurement1",
            SampleRecord::valid(Value::Float64(1.0), 0),
        );
        assert!(store.get(1001).is_none());
    }
}
