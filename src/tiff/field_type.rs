//! TIFF field types and typed value encoding/decoding.
//!
//! Field type codes and element sizes follow TIFF 6.0 §2, plus the
//! EXIF `IFD` pointer type (13).

use crate::byteio::ByteOrder;
use crate::error::{ReadError, Result};

/// On-disk TIFF field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// 8-bit unsigned integer (1)
    Byte,
    /// NUL-terminated 7-bit ASCII (2)
    Ascii,
    /// 16-bit unsigned integer (3)
    Short,
    /// 32-bit unsigned integer (4)
    Long,
    /// Two LONGs: numerator, denominator (5)
    Rational,
    /// 8-bit signed integer (6)
    SByte,
    /// Opaque 8-bit data (7)
    Undefined,
    /// 16-bit signed integer (8)
    SShort,
    /// 32-bit signed integer (9)
    SLong,
    /// Two SLONGs: numerator, denominator (10)
    SRational,
    /// 32-bit IEEE float (11)
    Float,
    /// 64-bit IEEE float (12)
    Double,
    /// 32-bit IFD offset (13)
    Ifd,
}

impl FieldType {
    /// Decode a wire field type code
    pub fn from_code(code: u16) -> Result<Self> {
        Ok(match code {
            1 => FieldType::Byte,
            2 => FieldType::Ascii,
            3 => FieldType::Short,
            4 => FieldType::Long,
            5 => FieldType::Rational,
            6 => FieldType::SByte,
            7 => FieldType::Undefined,
            8 => FieldType::SShort,
            9 => FieldType::SLong,
            10 => FieldType::SRational,
            11 => FieldType::Float,
            12 => FieldType::Double,
            13 => FieldType::Ifd,
            _ => return Err(ReadError::UnknownFieldType(code)),
        })
    }

    pub fn code(self) -> u16 {
        match self {
            FieldType::Byte => 1,
            FieldType::Ascii => 2,
            FieldType::Short => 3,
            FieldType::Long => 4,
            FieldType::Rational => 5,
            FieldType::SByte => 6,
            FieldType::Undefined => 7,
            FieldType::SShort => 8,
            FieldType::SLong => 9,
            FieldType::SRational => 10,
            FieldType::Float => 11,
            FieldType::Double => 12,
            FieldType::Ifd => 13,
        }
    }

    /// On-disk size of one element of this type
    pub fn element_size(self) -> usize {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::SByte | FieldType::Undefined => 1,
            FieldType::Short | FieldType::SShort => 2,
            FieldType::Long | FieldType::SLong | FieldType::Float | FieldType::Ifd => 4,
            FieldType::Rational | FieldType::SRational | FieldType::Double => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FieldType::Byte => "BYTE",
            FieldType::Ascii => "ASCII",
            FieldType::Short => "SHORT",
            FieldType::Long => "LONG",
            FieldType::Rational => "RATIONAL",
            FieldType::SByte => "SBYTE",
            FieldType::Undefined => "UNDEFINED",
            FieldType::SShort => "SSHORT",
            FieldType::SLong => "SLONG",
            FieldType::SRational => "SRATIONAL",
            FieldType::Float => "FLOAT",
            FieldType::Double => "DOUBLE",
            FieldType::Ifd => "IFD",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded TIFF field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Byte(Vec<u8>),
    Ascii(String),
    Short(Vec<u16>),
    Long(Vec<u32>),
    Rational(Vec<(u32, u32)>),
    SByte(Vec<i8>),
    Undefined(Vec<u8>),
    SShort(Vec<i16>),
    SLong(Vec<i32>),
    SRational(Vec<(i32, i32)>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Ifd(Vec<u32>),
}

impl Value {
    /// Decode raw field bytes into a typed value
    pub fn decode(field_type: FieldType, count: u32, bytes: &[u8], order: ByteOrder) -> Result<Value> {
        let count = count as usize;
        let needed = count * field_type.element_size();
        if bytes.len() != needed {
            return Err(ReadError::TruncatedInput {
                offset: bytes.len(),
                needed,
            });
        }

        let u16s = |b: &[u8]| -> Vec<u16> {
            b.chunks_exact(2).map(|c| order.u16_from([c[0], c[1]])).collect()
        };
        let u32s = |b: &[u8]| -> Vec<u32> {
            b.chunks_exact(4)
                .map(|c| order.u32_from([c[0], c[1], c[2], c[3]]))
                .collect()
        };

        Ok(match field_type {
            FieldType::Byte => Value::Byte(bytes.to_vec()),
            FieldType::Undefined => Value::Undefined(bytes.to_vec()),
            FieldType::SByte => Value::SByte(bytes.iter().map(|&b| b as i8).collect()),
            FieldType::Ascii => {
                // terminating NUL and padding are not part of the value
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                Value::Ascii(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
            FieldType::Short => Value::Short(u16s(bytes)),
            FieldType::SShort => Value::SShort(u16s(bytes).into_iter().map(|v| v as i16).collect()),
            FieldType::Long => Value::Long(u32s(bytes)),
            FieldType::Ifd => Value::Ifd(u32s(bytes)),
            FieldType::SLong => Value::SLong(u32s(bytes).into_iter().map(|v| v as i32).collect()),
            FieldType::Float => Value::Float(u32s(bytes).into_iter().map(f32::from_bits).collect()),
            FieldType::Double => Value::Double(
                bytes
                    .chunks_exact(8)
                    .map(|c| {
                        f64::from_bits(order.u64_from([
                            c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7],
                        ]))
                    })
                    .collect(),
            ),
            FieldType::Rational => {
                let words = u32s(bytes);
                Value::Rational(words.chunks_exact(2).map(|p| (p[0], p[1])).collect())
            }
            FieldType::SRational => {
                let words = u32s(bytes);
                Value::SRational(
                    words
                        .chunks_exact(2)
                        .map(|p| (p[0] as i32, p[1] as i32))
                        .collect(),
                )
            }
        })
    }

    /// Encode a typed value to raw field bytes
    pub fn encode(&self, order: ByteOrder) -> (FieldType, u32, Vec<u8>) {
        match self {
            Value::Byte(v) => (FieldType::Byte, v.len() as u32, v.clone()),
            Value::Undefined(v) => (FieldType::Undefined, v.len() as u32, v.clone()),
            Value::SByte(v) => (
                FieldType::SByte,
                v.len() as u32,
                v.iter().map(|&b| b as u8).collect(),
            ),
            Value::Ascii(s) => {
                let mut bytes = s.as_bytes().to_vec();
                bytes.push(0);
                (FieldType::Ascii, bytes.len() as u32, bytes)
            }
            Value::Short(v) => {
                let mut out = Vec::with_capacity(v.len() * 2);
                for &x in v {
                    order.push_u16(&mut out, x);
                }
                (FieldType::Short, v.len() as u32, out)
            }
            Value::SShort(v) => {
                let mut out = Vec::with_capacity(v.len() * 2);
                for &x in v {
                    order.push_u16(&mut out, x as u16);
                }
                (FieldType::SShort, v.len() as u32, out)
            }
            Value::Long(v) => {
                let mut out = Vec::with_capacity(v.len() * 4);
                for &x in v {
                    order.push_u32(&mut out, x);
                }
                (FieldType::Long, v.len() as u32, out)
            }
            Value::Ifd(v) => {
                let mut out = Vec::with_capacity(v.len() * 4);
                for &x in v {
                    order.push_u32(&mut out, x);
                }
                (FieldType::Ifd, v.len() as u32, out)
            }
            Value::SLong(v) => {
                let mut out = Vec::with_capacity(v.len() * 4);
                for &x in v {
                    order.push_u32(&mut out, x as u32);
                }
                (FieldType::SLong, v.len() as u32, out)
            }
            Value::Float(v) => {
                let mut out = Vec::with_capacity(v.len() * 4);
                for &x in v {
                    order.push_u32(&mut out, x.to_bits());
                }
                (FieldType::Float, v.len() as u32, out)
            }
            Value::Double(v) => {
                let mut out = Vec::with_capacity(v.len() * 8);
                for &x in v {
                    out.extend_from_slice(&order.u64_bytes(x.to_bits()));
                }
                (FieldType::Double, v.len() as u32, out)
            }
            Value::Rational(v) => {
                let mut out = Vec::with_capacity(v.len() * 8);
                for &(n, d) in v {
                    order.push_u32(&mut out, n);
                    order.push_u32(&mut out, d);
                }
                (FieldType::Rational, v.len() as u32, out)
            }
            Value::SRational(v) => {
                let mut out = Vec::with_capacity(v.len() * 8);
                for &(n, d) in v {
                    order.push_u32(&mut out, n as u32);
                    order.push_u32(&mut out, d as u32);
                }
                (FieldType::SRational, v.len() as u32, out)
            }
        }
    }
}
