use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use gridlink_core::{gateway::Component, PointStore};
use gridlink_error::GwResult;
use gridlink_models::{modbus_map, Mapping, Point, RecordFlag, SampleRecord, SourceProtocol, Value};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

const CHANNEL_PREFIX: &str = "modbus_";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationSummary {
    pub registered: usize,
    pub skipped: usize,
}

/// Maps Modbus holding-register samples onto the point store.
///
/// Scaling happens here and nowhere else: `scaled = raw * factor + offset`,
/// carried as a short float the way the registers are mapped. Modbus has no
/// source timestamps, so points are stamped with gateway time.
pub struct ModbusInputHandler {
    store: Arc<PointStore>,
    channels: DashMap<String, Mapping>,
}

impl ModbusInputHandler {
    pub fn new(store: Arc<PointStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            channels: DashMap::new(),
        })
    }

    /// Attach the mapped subset of the given channel ids; see the 61850
    /// adapter for the counting rules.
    pub fn register_channels<I, S>(&self, channel_ids: I) -> RegistrationSummary
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut summary = RegistrationSummary::default();
        for channel_id in channel_ids {
            let channel_id = channel_id.as_ref();
            if !channel_id.starts_with(CHANNEL_PREFIX) {
                continue;
            }
            match modbus_map().get(channel_id) {
                Some(mapping) => {
                    info!(
                        channel = channel_id,
                        ioa = mapping.ioa,
                        scale = mapping.scaling_factor,
                        "Modbus channel mapped"
                    );
                    self.channels
                        .insert(channel_id.to_string(), mapping.clone());
                    summary.registered += 1;
                }
                None => {
                    debug!(channel = channel_id, "Skipping unmapped Modbus channel");
                    summary.skipped += 1;
                }
            }
        }
        info!(
            registered = summary.registered,
            skipped = summary.skipped,
            "Modbus init complete"
        );
        summary
    }

    /// Ingress callback from the Modbus client library.
    pub fn on_record(&self, channel_id: &str, record: SampleRecord) {
        let Some(mapping) = self.channels.get(channel_id) else {
            return;
        };

        if record.flag != RecordFlag::Valid {
            info!(channel = channel_id, flag = ?record.flag, "Invalid flag, dropping sample");
            return;
        }
        let Some(raw) = record.value else {
            trace!(channel = channel_id, "Empty sample");
            return;
        };

        let value = Self::apply_scaling(&mapping, raw);

        let mut point = Point::new(
            mapping.ioa,
            mapping.common_address,
            mapping.asdu_type,
            value,
            Utc::now().timestamp_millis(),
            true,
        );
        point.id = channel_id.to_string();
        point.source_protocol = SourceProtocol::ModbusTcp;
        point.source_address = mapping.description.to_string();
        point.description = mapping.description.to_string();

        debug!(channel = channel_id, ioa = point.ioa, value = %point.value, "Modbus sample");
        self.store.update(point);
    }

    /// `scaled = raw * factor + offset`, numeric payloads only; anything
    /// else passes through untouched.
    fn apply_scaling(mapping: &Mapping, raw: Value) -> Value {
        match raw.as_f64() {
            Ok(n) => Value::Float32((n * mapping.scaling_factor + mapping.offset) as f32),
            Err(_) => raw,
        }
    }

    pub fn registered_count(&self) -> usize {
        self.channels.len()
    }
}

#[async_trait]
impl Component for ModbusInputHandler {
    fn name(&self) -> &str {
        "modbus-input"
    }

    async fn start(&self) -> GwResult<()> {
        info!("Activating Modbus TCP input handler");
        self.register_channels(modbus_map().keys().copied());
        Ok(())
    }

    async fn stop(&self) -> GwResult<()> {
        let count = self.channels.len();
        self.channels.clear();
        if count > 0 {
            warn!(count, "Detached Modbus channels");
        }
        info!("Modbus input handler deactivated");
        Ok(())
    }
}
