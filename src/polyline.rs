//! Flexible polyline codec for route geometries.
//!
//! Routes arrive from the routing backend as a compact ASCII string: a
//! version varint, a packed header varint, then zigzag-encoded deltas for
//! lat, lng and an optional third dimension. Each character carries 5 bits
//! of payload plus a continuation flag (`0x20`).
//!
//! Decoding happens at the boundary; the rest of the crate works with
//! [`Polyline`] point lists.

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::geo::GeoPoint;

/// Only version understood by this codec.
pub const FORMAT_VERSION: u64 = 1;

/// Precision used by the routing backend (5 decimal places, ~1.1 m).
pub const DEFAULT_PRECISION: u8 = 5;

const MAX_PRECISION: u8 = 15;

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

const CONTINUATION: u64 = 0x20;
const PAYLOAD_MASK: u64 = 0x1f;

/// ASCII -> 6-bit value; -1 for characters outside the alphabet.
const DECODING_TABLE: [i8; 128] = {
    let mut table = [-1i8; 128];
    let mut i = 0;
    while i < ALPHABET.len() {
        table[ALPHABET[i] as usize] = i as i8;
        i += 1;
    }
    table
};

/// Meaning of the optional third coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThirdDimension {
    Absent,
    Level,
    Altitude,
    Elevation,
    Custom1,
    Custom2,
}

impl ThirdDimension {
    fn to_bits(self) -> u64 {
        match self {
            ThirdDimension::Absent => 0,
            ThirdDimension::Level => 1,
            ThirdDimension::Altitude => 2,
            ThirdDimension::Elevation => 3,
            ThirdDimension::Custom1 => 6,
            ThirdDimension::Custom2 => 7,
        }
    }

    fn from_bits(bits: u64) -> Result<Self, CodecError> {
        match bits {
            0 => Ok(ThirdDimension::Absent),
            1 => Ok(ThirdDimension::Level),
            2 => Ok(ThirdDimension::Altitude),
            3 => Ok(ThirdDimension::Elevation),
            6 => Ok(ThirdDimension::Custom1),
            7 => Ok(ThirdDimension::Custom2),
            other => Err(CodecError::InvalidHeader(format!(
                "reserved third dimension {other}"
            ))),
        }
    }

    /// Whether points carry a third value.
    pub fn is_present(self) -> bool {
        self != ThirdDimension::Absent
    }
}

/// Decoded header: precision is bits 0-3, third dimension bits 4-6,
/// third dimension precision bits 7-10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub precision: u8,
    pub third_dim: ThirdDimension,
    pub third_dim_precision: u8,
}

impl Default for Header {
    fn default() -> Self {
        Self::new(DEFAULT_PRECISION)
    }
}

impl Header {
    /// 2D header with the given precision.
    pub fn new(precision: u8) -> Self {
        Self {
            precision,
            third_dim: ThirdDimension::Absent,
            third_dim_precision: 0,
        }
    }

    /// Adds a third dimension encoded at `precision` decimal places.
    pub fn with_third_dim(mut self, third_dim: ThirdDimension, precision: u8) -> Self {
        self.third_dim = third_dim;
        self.third_dim_precision = precision;
        self
    }

    fn validate(&self) -> Result<(), CodecError> {
        if self.precision > MAX_PRECISION {
            return Err(CodecError::InvalidHeader(format!(
                "precision {} exceeds {MAX_PRECISION}",
                self.precision
            )));
        }
        if self.third_dim_precision > MAX_PRECISION {
            return Err(CodecError::InvalidHeader(format!(
                "third dimension precision {} exceeds {MAX_PRECISION}",
                self.third_dim_precision
            )));
        }
        Ok(())
    }

    fn pack(&self) -> u64 {
        u64::from(self.precision)
            | (self.third_dim.to_bits() << 4)
            | (u64::from(self.third_dim_precision) << 7)
    }

    fn unpack(packed: u64) -> Result<Self, CodecError> {
        if packed >> 11 != 0 {
            return Err(CodecError::InvalidHeader(format!(
                "unknown header bits in {packed:#x}"
            )));
        }
        let header = Self {
            precision: (packed & 0x0f) as u8,
            third_dim: ThirdDimension::from_bits((packed >> 4) & 0x07)?,
            third_dim_precision: ((packed >> 7) & 0x0f) as u8,
        };
        header.validate()?;
        Ok(header)
    }

    fn dimensions(&self) -> usize {
        if self.third_dim.is_present() { 3 } else { 2 }
    }
}

/// A route geometry as decoded coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    header: Header,
    points: Vec<GeoPoint>,
}

impl Polyline {
    /// Creates a 2D polyline at the default precision.
    pub fn new(points: Vec<GeoPoint>) -> Self {
        Self {
            header: Header::default(),
            points,
        }
    }

    /// Creates a polyline that encodes with `header`, e.g. to carry altitude.
    pub fn with_header(header: Header, points: Vec<GeoPoint>) -> Self {
        Self { header, points }
    }

    /// Header this polyline was decoded with or will encode with.
    pub fn header(&self) -> Header {
        self.header
    }

    /// Decoded points, in route order.
    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn into_points(self) -> Vec<GeoPoint> {
        self.points
    }

    /// Encodes with this polyline's own header.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidHeader`] if the header precision is out
    /// of range.
    pub fn encode(&self) -> Result<String, CodecError> {
        encode_with(&self.points, self.header)
    }
}

/// Reads unsigned varints from the character stream.
struct VarintReader<'a> {
    chars: std::iter::Enumerate<std::str::Chars<'a>>,
}

impl<'a> VarintReader<'a> {
    fn new(encoded: &'a str) -> Self {
        Self {
            chars: encoded.chars().enumerate(),
        }
    }

    /// Next varint, `Ok(None)` at a clean end of input.
    fn next_varint(&mut self) -> Result<Option<u64>, CodecError> {
        let mut result: u64 = 0;
        let mut shift: u32 = 0;
        let mut started = false;

        for (position, character) in self.chars.by_ref() {
            started = true;
            let value = decode_char(position, character)?;
            if shift >= 64 || (shift > 0 && (value & PAYLOAD_MASK) >> (64 - shift) != 0) {
                return Err(CodecError::Overflow { position });
            }
            result |= (value & PAYLOAD_MASK) << shift;
            if value & CONTINUATION == 0 {
                return Ok(Some(result));
            }
            shift += 5;
        }

        if started {
            Err(CodecError::Truncated)
        } else {
            Ok(None)
        }
    }
}

fn decode_char(position: usize, character: char) -> Result<u64, CodecError> {
    let code = character as u32;
    if code < 128 {
        let value = DECODING_TABLE[code as usize];
        if value >= 0 {
            return Ok(value as u64);
        }
    }
    Err(CodecError::Format {
        position,
        character,
    })
}

fn zigzag_decode(raw: u64) -> i64 {
    let value = raw as i64;
    let value = if value & 1 != 0 { !value } else { value };
    value >> 1
}

fn zigzag_encode(value: i64) -> u64 {
    let shifted = value << 1;
    (if value < 0 { !shifted } else { shifted }) as u64
}

fn read_header(reader: &mut VarintReader<'_>) -> Result<Header, CodecError> {
    let version = reader.next_varint()?.ok_or(CodecError::MissingHeader)?;
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let packed = reader.next_varint()?.ok_or(CodecError::MissingHeader)?;
    Header::unpack(packed)
}

/// Decodes only the header of an encoded polyline.
///
/// # Errors
///
/// Same header failures as [`decode`].
pub fn decode_header(encoded: &str) -> Result<Header, CodecError> {
    read_header(&mut VarintReader::new(encoded))
}

/// Decodes a flexible polyline into a point list.
///
/// Points outside the valid lat/lng ranges are dropped. The running totals
/// still include their deltas, so later points decode correctly.
///
/// # Errors
///
/// - [`CodecError::UnsupportedVersion`] if the version is not 1; no points
///   are decoded in that case.
/// - A format-family error for characters outside the alphabet, truncated
///   varints, incomplete tuples or a bad header.
/// - [`CodecError::EmptyRoute`] if fewer than two valid points remain.
pub fn decode(encoded: &str) -> Result<Polyline, CodecError> {
    let mut reader = VarintReader::new(encoded);
    let header = read_header(&mut reader)?;

    let dims = header.dimensions();
    let multiplier = 10f64.powi(i32::from(header.precision));
    let third_multiplier = 10f64.powi(i32::from(header.third_dim_precision));

    let mut totals = [0i64; 3];
    let mut points = Vec::new();
    let mut dropped = 0usize;

    'tuples: loop {
        for (dim, total) in totals.iter_mut().enumerate().take(dims) {
            let raw = match reader.next_varint()? {
                Some(raw) => raw,
                None if dim == 0 => break 'tuples,
                None => return Err(CodecError::IncompleteTuple),
            };
            *total = total
                .checked_add(zigzag_decode(raw))
                .ok_or(CodecError::Overflow { position: points.len() + dropped })?;
        }

        let mut point = GeoPoint::new(totals[0] as f64 / multiplier, totals[1] as f64 / multiplier);
        if header.third_dim.is_present() {
            point.alt = Some(totals[2] as f64 / third_multiplier);
        }

        if point.is_valid() {
            points.push(point);
        } else {
            dropped += 1;
        }
    }

    if dropped > 0 {
        tracing::debug!(dropped, kept = points.len(), "dropped out-of-range polyline points");
    }
    if points.len() < 2 {
        return Err(CodecError::EmptyRoute {
            surviving: points.len(),
        });
    }

    Ok(Polyline { header, points })
}

/// Encodes 2D points at the given precision.
///
/// # Errors
///
/// Returns [`CodecError::InvalidHeader`] if `precision` exceeds 15.
pub fn encode(points: &[GeoPoint], precision: u8) -> Result<String, CodecError> {
    encode_with(points, Header::new(precision))
}

/// Encodes points with an explicit header.
///
/// Coordinates are rounded to the header precision before the deltas are
/// taken, so decoding returns the quantized values exactly. A missing `alt`
/// encodes as zero when the header has a third dimension; `alt` is ignored
/// otherwise.
///
/// # Errors
///
/// Returns [`CodecError::InvalidHeader`] if a precision exceeds 15.
pub fn encode_with(points: &[GeoPoint], header: Header) -> Result<String, CodecError> {
    header.validate()?;

    let multiplier = 10f64.powi(i32::from(header.precision));
    let third_multiplier = 10f64.powi(i32::from(header.third_dim_precision));
    let dims = header.dimensions();

    let mut out = String::with_capacity(4 + points.len() * 4 * dims);
    push_unsigned(&mut out, FORMAT_VERSION);
    push_unsigned(&mut out, header.pack());

    let mut last = [0i64; 3];
    for point in points {
        let scaled = [
            (point.lat * multiplier).round() as i64,
            (point.lng * multiplier).round() as i64,
            (point.alt.unwrap_or(0.0) * third_multiplier).round() as i64,
        ];
        for dim in 0..dims {
            push_unsigned(&mut out, zigzag_encode(scaled[dim] - last[dim]));
            last[dim] = scaled[dim];
        }
    }

    Ok(out)
}

fn push_unsigned(out: &mut String, mut value: u64) {
    while value > PAYLOAD_MASK {
        out.push(ALPHABET[((value & PAYLOAD_MASK) | CONTINUATION) as usize] as char);
        value >>= 5;
    }
    out.push(ALPHABET[value as usize] as char);
}
