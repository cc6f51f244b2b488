//! GoPro Metadata Format (GPMF) parser for GoPro Meta.
//!
//! GoPro cameras embed sensor telemetry in a metadata track of the video
//! file. The track is a sequence of KLV (key, length, value) records. This
//! crate parses a fully loaded metadata buffer into a KLV tree and extracts
//! the GPS and luminance streams as telemetry samples.
//!
//! # KLV Layout
//!
//! ```text
//! [FourCC: 4 bytes][type: 1][struct size: 1][repeat: 2, BE][payload][padding]
//! ```
//!
//! - `type` is an ASCII type character (see [`ValueType`]), or `0` when the
//!   payload is itself a list of KLVs
//! - the payload is `struct size * repeat` bytes, zero padded to a multiple
//!   of 4
//! - all multi-byte values are big-endian
//!
//! # Streams
//!
//! Sensor data lives in `DEVC` → `STRM` containers. Each `STRM` holds a
//! stream name (`STNM`), optional timestamp (`STMP`, microseconds), scale
//! divisors (`SCAL`), an optional structure description for complex records
//! (`TYPE`) and the data record itself (`GPS9`, `YAVG`, ...).

use derive_more::{Display, Error};
use gopro_meta_telemetry::{GpsSample, LuminanceSample};
use log::{debug, trace, warn};

/// Size of a KLV header in bytes: 4 + 1 + 1 + 2.
pub const KLV_HEADER_SIZE: usize = 8;

/// KLV payloads are padded to this alignment.
const ALIGNMENT: usize = 4;

/// Four character record key.
pub type FourCc = [u8; 4];

/// Stream container.
pub const STRM: FourCc = *b"STRM";
/// Stream name.
pub const STNM: FourCc = *b"STNM";
/// Stream start timestamp in microseconds.
pub const STMP: FourCc = *b"STMP";
/// Scale divisors for the data record.
pub const SCAL: FourCc = *b"SCAL";
/// Structure description of a complex record.
pub const TYPE: FourCc = *b"TYPE";
/// GPS with per-sample time and fix: lat, lon, alt, 2D speed, 3D speed, days, secs, DOP, fix.
pub const GPS9: FourCc = *b"GPS9";
/// Average frame luminance.
pub const YAVG: FourCc = *b"YAVG";

/// Milliseconds per day, for GPS9 day counts.
const MS_PER_DAY: f64 = 86_400_000.0;

/// Maximum container nesting depth accepted by [`parse`].
///
/// Real files nest `DEVC` → `STRM` → record; anything deeper is malformed.
pub const MAX_DEPTH: usize = 8;

/// Assumed duration of the last `YAVG` block when no earlier block gives
/// one. Cameras flush a metadata payload about once per second.
const DEFAULT_BLOCK_MS: i64 = 1000;

/// Minimum number of GPS9 fields needed to build a sample (up to `secs`).
const GPS9_MIN_FIELDS: usize = 7;

/// KLV value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// Payload is a list of nested KLVs.
    Nested,
    /// `b`
    I8,
    /// `B`
    U8,
    /// `c`: ASCII string
    Char,
    /// `d`
    F64,
    /// `f`
    F32,
    /// `F`: four character code
    FourCc,
    /// `G`: 128-bit identifier
    Guid,
    /// `j`
    I64,
    /// `J`
    U64,
    /// `l`
    I32,
    /// `L`
    U32,
    /// `q`: Q15.16 fixed point
    Q15,
    /// `Q`: Q31.32 fixed point
    Q31,
    /// `s`
    I16,
    /// `S`
    U16,
    /// `U`: UTC date and time string
    Utc,
    /// `?`: structure described by a sibling `TYPE` record
    Complex,
    /// Any other type byte.
    Unknown(u8),
}

impl ValueType {
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Nested,
            b'b' => Self::I8,
            b'B' => Self::U8,
            b'c' => Self::Char,
            b'd' => Self::F64,
            b'f' => Self::F32,
            b'F' => Self::FourCc,
            b'G' => Self::Guid,
            b'j' => Self::I64,
            b'J' => Self::U64,
            b'l' => Self::I32,
            b'L' => Self::U32,
            b'q' => Self::Q15,
            b'Q' => Self::Q31,
            b's' => Self::I16,
            b'S' => Self::U16,
            b'U' => Self::Utc,
            b'?' => Self::Complex,
            other => Self::Unknown(other),
        }
    }

    /// Human-readable label for this type.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Nested => "nested",
            Self::I8 => "int8",
            Self::U8 => "uint8",
            Self::Char => "string",
            Self::F64 => "double",
            Self::F32 => "float",
            Self::FourCc => "fourcc",
            Self::Guid => "guid",
            Self::I64 => "int64",
            Self::U64 => "uint64",
            Self::I32 => "int32",
            Self::U32 => "uint32",
            Self::Q15 => "Q15.16",
            Self::Q31 => "Q31.32",
            Self::I16 => "int16",
            Self::U16 => "uint16",
            Self::Utc => "utc",
            Self::Complex => "complex",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Errors that can occur while parsing GPMF data.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum GpmfError {
    /// A header or payload extends past the end of its buffer.
    #[display("truncated KLV at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    /// A scale divisor is zero.
    #[display("zero scale for {fourcc} field {index}")]
    InvalidScale { fourcc: String, index: usize },
    /// A record does not have the expected shape.
    #[display("malformed {fourcc} record: {reason}")]
    BadStructure {
        fourcc: String,
        reason: &'static str,
    },
}

/// A parsed KLV record.
#[derive(Debug, Clone, PartialEq)]
pub struct Klv {
    pub fourcc: FourCc,
    pub value_type: ValueType,
    /// Size of one sample in bytes.
    pub struct_size: u8,
    /// Number of samples.
    pub repeat: u16,
    /// Unpadded payload (`struct_size * repeat` bytes).
    pub payload: Vec<u8>,
    /// Nested records when `value_type` is [`ValueType::Nested`].
    pub children: Vec<Klv>,
}

fn fourcc_lossy(fourcc: &FourCc) -> String {
    String::from_utf8_lossy(fourcc).into_owned()
}

impl Klv {
    /// FourCC as a string, or `"????"` if it is not ASCII.
    #[must_use]
    pub fn fourcc_str(&self) -> &str {
        match core::str::from_utf8(&self.fourcc) {
            Ok(s) if self.fourcc.is_ascii() => s,
            _ => "????",
        }
    }

    /// First direct child with the given key.
    #[must_use]
    pub fn child(&self, fourcc: FourCc) -> Option<&Klv> {
        self.children.iter().find(|c| c.fourcc == fourcc)
    }

    /// Payload split into samples of `struct_size` bytes.
    pub fn samples(&self) -> impl Iterator<Item = &[u8]> {
        self.payload
            .chunks_exact(usize::from(self.struct_size).max(1))
            .take(usize::from(self.repeat))
    }

    /// String payload with trailing NUL bytes and whitespace removed.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        if self.value_type != ValueType::Char {
            return None;
        }
        core::str::from_utf8(&self.payload)
            .ok()
            .map(|s| s.trim_end_matches('\0').trim())
    }

    /// `uint8` payload.
    #[must_use]
    pub fn as_u8s(&self) -> Option<&[u8]> {
        (self.value_type == ValueType::U8).then_some(self.payload.as_slice())
    }

    /// `int32` payload, one value per 4 bytes.
    #[must_use]
    pub fn as_i32s(&self) -> Option<Vec<i32>> {
        (self.value_type == ValueType::I32).then(|| {
            self.payload
                .chunks_exact(4)
                .map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
                .collect()
        })
    }

    /// `uint64` payload, one value per 8 bytes.
    #[must_use]
    pub fn as_u64s(&self) -> Option<Vec<u64>> {
        (self.value_type == ValueType::U64).then(|| {
            self.payload
                .chunks_exact(8)
                .map(|b| u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                .collect()
        })
    }

    /// Every scalar value of a numeric payload as `f64`.
    ///
    /// Returns `None` for nested, string, and complex records.
    #[must_use]
    pub fn as_f64s(&self) -> Option<Vec<f64>> {
        let size = scalar_size(self.value_type)?;
        let mut values = Vec::with_capacity(self.payload.len() / size);
        for chunk in self.payload.chunks_exact(size) {
            values.push(read_scalar(self.value_type, chunk)?);
        }
        Some(values)
    }
}

/// Byte size of a numeric scalar type, `None` for non-numeric types.
fn scalar_size(value_type: ValueType) -> Option<usize> {
    match value_type {
        ValueType::I8 | ValueType::U8 => Some(1),
        ValueType::I16 | ValueType::U16 => Some(2),
        ValueType::I32 | ValueType::U32 | ValueType::F32 | ValueType::Q15 => Some(4),
        ValueType::I64 | ValueType::U64 | ValueType::F64 | ValueType::Q31 => Some(8),
        _ => None,
    }
}

/// Decode one big-endian scalar. `bytes` must be exactly `scalar_size` long.
#[allow(clippy::cast_precision_loss)] // 64-bit counters lose precision past 2^53, as in the camera tools
fn read_scalar(value_type: ValueType, bytes: &[u8]) -> Option<f64> {
    let value = match value_type {
        ValueType::I8 => f64::from(i8::from_be_bytes(bytes.try_into().ok()?)),
        ValueType::U8 => f64::from(bytes[0]),
        ValueType::I16 => f64::from(i16::from_be_bytes(bytes.try_into().ok()?)),
        ValueType::U16 => f64::from(u16::from_be_bytes(bytes.try_into().ok()?)),
        ValueType::I32 => f64::from(i32::from_be_bytes(bytes.try_into().ok()?)),
        ValueType::U32 => f64::from(u32::from_be_bytes(bytes.try_into().ok()?)),
        ValueType::F32 => f64::from(f32::from_be_bytes(bytes.try_into().ok()?)),
        ValueType::Q15 => f64::from(i32::from_be_bytes(bytes.try_into().ok()?)) / 65_536.0,
        ValueType::I64 => i64::from_be_bytes(bytes.try_into().ok()?) as f64,
        ValueType::U64 => u64::from_be_bytes(bytes.try_into().ok()?) as f64,
        ValueType::F64 => f64::from_be_bytes(bytes.try_into().ok()?),
        ValueType::Q31 => i64::from_be_bytes(bytes.try_into().ok()?) as f64 / 4_294_967_296.0,
        _ => return None,
    };
    Some(value)
}

/// Parse a complete GPMF buffer into a list of top-level KLVs.
///
/// Zero bytes after the last record are treated as padding.
///
/// # Errors
///
/// Returns [`GpmfError::Truncated`] if a header or payload runs past the end
/// of the buffer (or of its enclosing record), and
/// [`GpmfError::BadStructure`] if containers nest deeper than [`MAX_DEPTH`].
pub fn parse(data: &[u8]) -> Result<Vec<Klv>, GpmfError> {
    parse_at(data, 0, 0)
}

/// Parse `data`, reporting offsets relative to `base` in the outer buffer.
/// `depth` is the number of enclosing containers.
fn parse_at(data: &[u8], base: usize, depth: usize) -> Result<Vec<Klv>, GpmfError> {
    let mut klvs = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        if data[offset..].iter().all(|&b| b == 0) {
            trace!("{} bytes of trailing padding at offset {}", data.len() - offset, base + offset);
            break;
        }
        let (klv, next) = parse_klv(data, offset, base, depth)?;
        klvs.push(klv);
        offset = next;
    }

    Ok(klvs)
}

/// Parse the KLV starting at `offset`. Returns the record and the offset
/// just past its padding.
fn parse_klv(
    data: &[u8],
    offset: usize,
    base: usize,
    depth: usize,
) -> Result<(Klv, usize), GpmfError> {
    let available = data.len() - offset;
    if available < KLV_HEADER_SIZE {
        return Err(GpmfError::Truncated {
            offset: base + offset,
            needed: KLV_HEADER_SIZE,
            available,
        });
    }

    let header = &data[offset..offset + KLV_HEADER_SIZE];
    let fourcc = [header[0], header[1], header[2], header[3]];
    let value_type = ValueType::from_u8(header[4]);
    let struct_size = header[5];
    let repeat = u16::from_be_bytes([header[6], header[7]]);

    let payload_len = usize::from(struct_size) * usize::from(repeat);
    let payload_start = offset + KLV_HEADER_SIZE;
    let payload_available = data.len() - payload_start;
    if payload_len > payload_available {
        return Err(GpmfError::Truncated {
            offset: base + payload_start,
            needed: payload_len,
            available: payload_available,
        });
    }

    let payload = &data[payload_start..payload_start + payload_len];
    let padding = (ALIGNMENT - payload_len % ALIGNMENT) % ALIGNMENT;
    // The final record of a buffer may omit its padding
    let next = (payload_start + payload_len + padding).min(data.len());

    trace!(
        "KLV {} type={} size={struct_size} repeat={repeat} at offset {}",
        fourcc_lossy(&fourcc),
        value_type.label(),
        base + offset
    );

    let children = if value_type == ValueType::Nested {
        if depth >= MAX_DEPTH {
            return Err(GpmfError::BadStructure {
                fourcc: fourcc_lossy(&fourcc),
                reason: "containers nested too deeply",
            });
        }
        parse_at(payload, base + payload_start, depth + 1)?
    } else {
        Vec::new()
    };

    Ok((
        Klv {
            fourcc,
            value_type,
            struct_size,
            repeat,
            payload: payload.to_vec(),
            children,
        },
        next,
    ))
}

/// Decode the samples of a data record into per-field `f64` values.
///
/// Complex (`?`) records are laid out according to `type_def` (the sibling
/// `TYPE` string); other numeric records are split into scalars of their
/// own type.
fn decode_fields(klv: &Klv, type_def: Option<&str>) -> Result<Vec<Vec<f64>>, GpmfError> {
    let bad = |reason| GpmfError::BadStructure {
        fourcc: fourcc_lossy(&klv.fourcc),
        reason,
    };

    let layout: Vec<ValueType> = if klv.value_type == ValueType::Complex {
        let type_def = type_def.ok_or_else(|| bad("complex record without TYPE"))?;
        type_def.bytes().map(ValueType::from_u8).collect()
    } else {
        let size = scalar_size(klv.value_type).ok_or_else(|| bad("not a numeric record"))?;
        vec![klv.value_type; usize::from(klv.struct_size) / size]
    };

    klv.samples()
        .map(|sample| -> Result<Vec<f64>, GpmfError> {
            let mut fields = Vec::with_capacity(layout.len());
            let mut pos = 0;
            for &field_type in &layout {
                let size = scalar_size(field_type).ok_or_else(|| bad("unsupported field type"))?;
                let bytes = sample
                    .get(pos..pos + size)
                    .ok_or_else(|| bad("sample shorter than its TYPE"))?;
                fields.push(read_scalar(field_type, bytes).ok_or_else(|| bad("unsupported field type"))?);
                pos += size;
            }
            Ok(fields)
        })
        .collect()
}

/// Divide each field by its `SCAL` divisor.
///
/// A single divisor applies to every field; missing divisors default to 1.
fn apply_scale(klv: &Klv, samples: &mut [Vec<f64>], scale: &[f64]) -> Result<(), GpmfError> {
    for (index, &divisor) in scale.iter().enumerate() {
        if divisor == 0.0 {
            return Err(GpmfError::InvalidScale {
                fourcc: fourcc_lossy(&klv.fourcc),
                index,
            });
        }
    }

    for fields in samples.iter_mut() {
        for (index, field) in fields.iter_mut().enumerate() {
            let divisor = match scale {
                [single] => *single,
                _ => scale.get(index).copied().unwrap_or(1.0),
            };
            *field /= divisor;
        }
    }
    Ok(())
}

/// Telemetry streams extracted from a GPMF buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Telemetry {
    pub gps: Vec<GpsSample>,
    pub luminance: Vec<LuminanceSample>,
}

/// Collect every `STRM` container in the tree, depth first.
fn collect_streams<'a>(klvs: &'a [Klv], out: &mut Vec<&'a Klv>) {
    for klv in klvs {
        if klv.fourcc == STRM {
            out.push(klv);
        }
        collect_streams(&klv.children, out);
    }
}

/// Stream start time in milliseconds, from `STMP` microseconds.
fn stream_start_ms(stream: &Klv) -> Option<i64> {
    let micros = stream.child(STMP)?.as_u64s()?.first().copied()?;
    i64::try_from(micros / 1000).ok()
}

#[allow(clippy::cast_possible_truncation)] // Milliseconds since 2000 fit comfortably in i64
fn extract_gps9(stream: &Klv, record: &Klv) -> Result<Vec<GpsSample>, GpmfError> {
    let type_def = stream.child(TYPE).and_then(Klv::as_str);
    let mut samples = decode_fields(record, type_def)?;
    let scale = stream.child(SCAL).and_then(Klv::as_f64s).unwrap_or_default();
    apply_scale(record, &mut samples, &scale)?;

    samples
        .iter()
        .map(|fields| {
            if fields.len() < GPS9_MIN_FIELDS {
                return Err(GpmfError::BadStructure {
                    fourcc: fourcc_lossy(&record.fourcc),
                    reason: "fewer than 7 fields per sample",
                });
            }
            let (days, secs) = (fields[5], fields[6]);
            Ok(GpsSample {
                latitude: fields[0],
                longitude: fields[1],
                altitude: fields[2],
                timestamp: (days * MS_PER_DAY + secs * 1000.0).round() as i64,
            })
        })
        .collect()
}

/// Luminance readings of one `YAVG` record, all stamped with the block's
/// `STMP` until [`spread_luminance`] assigns per-reading times.
struct LuminanceBlock {
    start_ms: i64,
    values: Vec<u8>,
}

fn extract_yavg(stream: &Klv, record: &Klv) -> Result<Option<LuminanceBlock>, GpmfError> {
    let Some(start_ms) = stream_start_ms(stream) else {
        warn!("YAVG stream without STMP timestamp, skipping");
        return Ok(None);
    };
    if record.value_type != ValueType::U8 {
        return Err(GpmfError::BadStructure {
            fourcc: fourcc_lossy(&record.fourcc),
            reason: "expected uint8 values",
        });
    }
    let values = record
        .samples()
        .filter_map(|sample| sample.first().copied())
        .collect();
    Ok(Some(LuminanceBlock { start_ms, values }))
}

/// Turn luminance blocks into individually timed samples.
///
/// Readings of a block are spaced evenly between its `STMP` and the `STMP`
/// of the following block. The last block reuses the duration of the one
/// before it, or [`DEFAULT_BLOCK_MS`] when it is the only block.
fn spread_luminance(mut blocks: Vec<LuminanceBlock>) -> Vec<LuminanceSample> {
    blocks.sort_by_key(|block| block.start_ms);

    let mut samples = Vec::with_capacity(blocks.iter().map(|b| b.values.len()).sum());
    let mut previous_duration = DEFAULT_BLOCK_MS;
    for (i, block) in blocks.iter().enumerate() {
        let duration = match blocks.get(i + 1) {
            Some(next) if next.start_ms > block.start_ms => next.start_ms - block.start_ms,
            Some(_) => 0,
            None => previous_duration,
        };
        if duration > 0 {
            previous_duration = duration;
        }

        let count = i128::try_from(block.values.len()).unwrap_or(i128::MAX);
        samples.extend(block.values.iter().zip(0i128..).map(|(&luminance, n)| {
            let step = i128::from(duration) * n / count;
            LuminanceSample {
                luminance,
                timestamp: block
                    .start_ms
                    .saturating_add(i64::try_from(step).unwrap_or(i64::MAX)),
            }
        }));
    }
    samples
}

/// Extract GPS and luminance samples from a parsed KLV tree.
///
/// Each returned stream is sorted by timestamp.
///
/// # Errors
///
/// Returns [`GpmfError::BadStructure`] or [`GpmfError::InvalidScale`] if a
/// GPS or luminance record cannot be decoded.
pub fn extract_telemetry(klvs: &[Klv]) -> Result<Telemetry, GpmfError> {
    let mut streams = Vec::new();
    collect_streams(klvs, &mut streams);
    debug!("Found {} streams", streams.len());

    let mut telemetry = Telemetry::default();
    let mut luminance_blocks = Vec::new();
    for stream in streams {
        let name = stream.child(STNM).and_then(Klv::as_str).unwrap_or("(unnamed)");
        if let Some(record) = stream.child(GPS9) {
            let gps = extract_gps9(stream, record)?;
            debug!("Stream \"{name}\": {} GPS9 samples", gps.len());
            telemetry.gps.extend(gps);
        } else if let Some(record) = stream.child(YAVG) {
            if let Some(block) = extract_yavg(stream, record)? {
                debug!("Stream \"{name}\": {} YAVG samples", block.values.len());
                luminance_blocks.push(block);
            }
        } else {
            trace!("Stream \"{name}\": no supported record");
        }
    }

    telemetry.gps.sort_by_key(|s| s.timestamp);
    telemetry.luminance = spread_luminance(luminance_blocks);
    Ok(telemetry)
}
