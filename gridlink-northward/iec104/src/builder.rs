use crate::protocol::{
    error::Result,
    frame::{
        asdu::{Asdu, Cause, CauseOfTransmission, TypeID},
        mproc::{
            measured_value_float, measured_value_scaled, single, MeasuredValueFloatInfo,
            MeasuredValueScaledInfo, ObjectQDS, ObjectSIQ, SinglePointInfo,
        },
    },
};
use chrono::{DateTime, Utc};
use gridlink_models::{AsduType, Point, Value};

/// Build a complete single-object ASDU from a point and a cause of
/// transmission.
///
/// Payload coercion follows the mapping contract rather than strict typing:
/// a numeric value on a single-point type encodes as `value != 0`, a
/// non-numeric value on a measurement type encodes as 0/0.0. Scaled values
/// clamp silently to the INT16 range. The IV quality bit mirrors
/// `!point.valid`; the gateway has no source for OV/BL/SB/NT.
///
/// Errors here mean the point cannot be represented; the caller logs and
/// skips it rather than tearing the connection down.
pub fn build_asdu(point: &Point, cause: Cause) -> Result<Asdu> {
    let cot = CauseOfTransmission::from_cause(cause);
    let ca = point.common_address;
    let invalid = !point.valid;

    match point.asdu_type {
        AsduType::MSpNa1 => single(
            TypeID::M_SP_NA_1,
            cot,
            ca,
            SinglePointInfo::new(point.ioa, ObjectSIQ::new_with_value(invalid, coerce_bool(&point.value)), None),
        ),
        AsduType::MSpTb1 => single(
            TypeID::M_SP_TB_1,
            cot,
            ca,
            SinglePointInfo::new(
                point.ioa,
                ObjectSIQ::new_with_value(invalid, coerce_bool(&point.value)),
                Some(event_time(point)),
            ),
        ),
        AsduType::MMeNb1 => measured_value_scaled(
            cot,
            ca,
            MeasuredValueScaledInfo {
                ioa: point.ioa,
                sva: coerce_scaled(&point.value),
                qds: ObjectQDS::new_with_invalid(invalid),
                time: None,
            },
        ),
        AsduType::MMeNc1 => measured_value_float(
            TypeID::M_ME_NC_1,
            cot,
            ca,
            MeasuredValueFloatInfo {
                ioa: point.ioa,
                r: coerce_float(&point.value),
                qds: ObjectQDS::new_with_invalid(invalid),
                time: None,
            },
        ),
        AsduType::MMeTf1 => measured_value_float(
            TypeID::M_ME_TF_1,
            cot,
            ca,
            MeasuredValueFloatInfo {
                ioa: point.ioa,
                r: coerce_float(&point.value),
                qds: ObjectQDS::new_with_invalid(invalid),
                time: Some(event_time(point)),
            },
        ),
    }
}

/// Source event time when the point carries one, gateway time otherwise.
fn event_time(point: &Point) -> DateTime<Utc> {
    if point.timestamp > 0 {
        DateTime::<Utc>::from_timestamp_millis(point.timestamp).unwrap_or_else(Utc::now)
    } else {
        Utc::now()
    }
}

fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Boolean(v) => *v,
        v if v.is_numeric() => v.as_f64().map(|n| n != 0.0).unwrap_or(false),
        _ => false,
    }
}

fn coerce_float(value: &Value) -> f32 {
    value.as_f32().unwrap_or(0.0)
}

fn coerce_scaled(value: &Value) -> i16 {
    value
        .as_i64()
        .map(|v| v.clamp(i16::MIN as i64, i16::MAX as i64) as i16)
        .unwrap_or(0)
}
