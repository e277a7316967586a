use anyhow::Result;
use byteorder::{LittleEndian, ReadBytesExt};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use std::io::Cursor;

// CP56Time2a
// |         Milliseconds(D7--D0)        | Milliseconds = 0-59999
// |         Milliseconds(D15--D8)       |
// | IV(D7)   RES1(D6)  Minutes(D5--D0)  | Minutes = 0-59, IV: 0 = valid, 1 = invalid
// | SU(D7)   RES2(D6-D5)  Hours(D4--D0) | Hours = 0-23, SU = summer time
// | DayOfWeek(D7--D5) DayOfMonth(D4--D0)| DayOfMonth = 1-31  DayOfWeek = 1-7
// | RES3(D7--D4)        Months(D3--D0)  | Months = 1-12
// | RES4(D7)            Year(D6--D0)    | Year = 0-99 (2000-based)

pub fn cp56time2a(time: DateTime<Utc>) -> Bytes {
    let mut buf = BytesMut::with_capacity(7);

    let msec = (time.nanosecond() / 1_000_000) as u16 + time.second() as u16 * 1000;
    let minute = time.minute() as u8;
    let hour = time.hour() as u8;
    let weekday = time.weekday().number_from_monday() as u8;
    let day = time.day() as u8;
    let month = time.month() as u8;
    let year = (time.year() - 2000) as u8;

    buf.put_u16_le(msec);
    buf.put_u8(minute);
    buf.put_u8(hour);
    buf.put_u8(weekday << 5 | day);
    buf.put_u8(month);
    buf.put_u8(year);

    buf.freeze()
}

/// Decode a CP56Time2a tag. Returns `None` when the IV bit is set or fewer
/// than seven octets remain.
pub fn decode_cp56time2a(rdr: &mut Cursor<&Bytes>) -> Result<Option<DateTime<Utc>>> {
    if rdr.remaining() < 7 {
        return Ok(None);
    }
    let millisecond = rdr.read_u16::<LittleEndian>()?;
    let msec = (millisecond % 1000) as i64;
    let sec = (millisecond / 1000) as u32;
    let min = rdr.read_u8()?;
    let invalid = min & 0x80;
    let min = (min & 0x3f) as u32;
    let hour = (rdr.read_u8()? & 0x1f) as u32;
    let day = (rdr.read_u8()? & 0x1f) as u32;
    let month = (rdr.read_u8()? & 0x0f) as u32;
    let year = 2000 + (rdr.read_u8()? & 0x7f) as i32;

    if invalid != 0 {
        return Ok(None);
    }
    let time = Utc
        .with_ymd_and_hms(year, month, day, hour, min, sec)
        .single()
        .map(|t| t + Duration::milliseconds(msec));
    Ok(time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cp56time2a_round_trips_to_millisecond() {
        let t = Utc.with_ymd_and_hms(2026, 1, 30, 10, 15, 30).unwrap()
            + Duration::milliseconds(123);
        let encoded = cp56time2a(t);
        assert_eq!(encoded.len(), 7);

        let bytes = Bytes::from(encoded);
        let mut rdr = Cursor::new(&bytes);
        let decoded = decode_cp56time2a(&mut rdr).unwrap().unwrap();
        assert_eq!(decoded, t);
    }

    #[test]
    fn short_buffer_is_none() {
        let bytes = Bytes::from_static(&[0x01, 0x02, 0x03]);
        let mut rdr = Cursor::new(&bytes);
        assert!(decode_cp56time2a(&mut rdr).unwrap().is_none());
    }

    #[test]
    fn invalid_bit_is_none() {
        let t = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        let mut raw = BytesMut::from(&cp56time2a(t)[..]);
        raw[2] |= 0x80; // IV
        let bytes = raw.freeze();
        let mut rdr = Cursor::new(&bytes);
        assert!(decode_cp56time2a(&mut rdr).unwrap().is_none());
    }
}
