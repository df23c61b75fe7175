use std::fmt;

use crate::format::FormatError;

pub const RECORD_SIZE: usize = 16;

pub const TAG_COPY: [u8; 4] = *b"COPY";
pub const TAG_PACK: [u8; 4] = *b"PACK";
pub const TAG_SUBB: [u8; 4] = *b"SUBB";
pub const TAG_SUBW: [u8; 4] = *b"SUBW";
pub const TAG_SUBL: [u8; 4] = *b"SUBL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Byte,
    Word,
    Long,
}

impl Width {
    pub fn bytes(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
            Self::Long => 4,
        }
    }

    pub fn mask(self, value: u32) -> u32 {
        match self {
            Self::Byte => value & 0xff,
            Self::Word => value & 0xffff,
            Self::Long => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    Copy { offset: u32, length: u32, align: u32 },
    Pack { offset: u32, length: u32, align: u32 },
    Subtract { width: Width, offset: u32, divisor: u32 },
}

impl Record {
    pub fn tag_str(&self) -> &'static str {
        match self {
            Self::Copy { .. } => "COPY",
            Self::Pack { .. } => "PACK",
            Self::Subtract { width: Width::Byte, .. } => "SUBB",
            Self::Subtract { width: Width::Word, .. } => "SUBW",
            Self::Subtract { width: Width::Long, .. } => "SUBL",
        }
    }

    pub fn tag(&self) -> [u8; 4] {
        let b = self.tag_str().as_bytes();
        [b[0], b[1], b[2], b[3]]
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Copy { offset, length, align } | Self::Pack { offset, length, align } => write!(
                f,
                "{} offset={offset:#x} length={length:#x} align={align:#x}",
                self.tag_str()
            ),
            Self::Subtract { offset, divisor, .. } => write!(
                f,
                "{} offset={offset:#x} divisor={divisor:#x}",
                self.tag_str()
            ),
        }
    }
}

pub fn parse_zinfo(input: &[u8]) -> Result<Vec<Record>, FormatError> {
    if input.len() % RECORD_SIZE != 0 {
        return Err(FormatError::InvalidRecordFile {
            len: input.len(),
            record_size: RECORD_SIZE,
        });
    }

    let mut reader = Reader::new(input);
    let mut records = Vec::with_capacity(input.len() / RECORD_SIZE);
    while !reader.is_eof() {
        let index = records.len();
        let tag = reader.read_tag();
        let a = reader.read_u32_ne();
        let b = reader.read_u32_ne();
        let c = reader.read_u32_ne();
        let record = match tag {
            TAG_COPY => Record::Copy {
                offset: a,
                length: b,
                align: c,
            },
            TAG_PACK => Record::Pack {
                offset: a,
                length: b,
                align: c,
            },
            TAG_SUBB | TAG_SUBW | TAG_SUBL => {
                let width = match tag[3] {
                    b'B' => Width::Byte,
                    b'W' => Width::Word,
                    _ => Width::Long,
                };
                Record::Subtract {
                    width,
                    offset: a,
                    divisor: b,
                }
            }
            _ => {
                return Err(FormatError::UnknownRecordType {
                    index,
                    tag: render_tag(&tag),
                })
            }
        };
        records.push(record);
    }
    Ok(records)
}

/// Encodes records back into the on-disk layout. Reserved words are zero.
pub fn encode_zinfo(records: &[Record]) -> Vec<u8> {
    let mut out = Vec::with_capacity(records.len() * RECORD_SIZE);
    for record in records {
        out.extend_from_slice(&record.tag());
        let fields = match *record {
            Record::Copy { offset, length, align } | Record::Pack { offset, length, align } => {
                [offset, length, align]
            }
            Record::Subtract { offset, divisor, .. } => [offset, divisor, 0],
        };
        for field in fields {
            out.extend_from_slice(&field.to_ne_bytes());
        }
    }
    out
}

// Tags are not NUL-terminated on disk, but a short tag may be NUL-padded.
fn render_tag(tag: &[u8; 4]) -> String {
    let end = tag.iter().position(|&b| b == 0).unwrap_or(tag.len());
    String::from_utf8_lossy(&tag[..end]).into_owned()
}

// Callers check the total length up front, so every read is in bounds.
struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn read_tag(&mut self) -> [u8; 4] {
        let bytes = self.read_bytes(4);
        [bytes[0], bytes[1], bytes[2], bytes[3]]
    }

    fn read_u32_ne(&mut self) -> u32 {
        let bytes = self.read_bytes(4);
        u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn read_bytes(&mut self, size: usize) -> &'a [u8] {
        let begin = self.pos;
        self.pos += size;
        &self.input[begin..self.pos]
    }
}

#[cfg(test)]
mod tests {
    use super::{encode_zinfo, parse_zinfo, Record, Width, RECORD_SIZE};
    use crate::format::FormatError;

    fn raw(tag: &[u8; 4], a: u32, b: u32, c: u32) -> Vec<u8> {
        let mut out = tag.to_vec();
        for v in [a, b, c] {
            out.extend_from_slice(&v.to_ne_bytes());
        }
        out
    }

    #[test]
    fn parses_every_record_kind_in_order() {
        let mut data = raw(b"COPY", 0, 0x100, 4);
        data.extend(raw(b"PACK", 0x100, 0x400, 16));
        data.extend(raw(b"SUBB", 0x10, 512, 0xdead_beef));
        data.extend(raw(b"SUBW", 0x12, 16, 0));
        data.extend(raw(b"SUBL", 0x14, 1, 0));

        let records = parse_zinfo(&data).expect("parse should succeed");
        assert_eq!(
            records,
            vec![
                Record::Copy {
                    offset: 0,
                    length: 0x100,
                    align: 4
                },
                Record::Pack {
                    offset: 0x100,
                    length: 0x400,
                    align: 16
                },
                Record::Subtract {
                    width: Width::Byte,
                    offset: 0x10,
                    divisor: 512
                },
                Record::Subtract {
                    width: Width::Word,
                    offset: 0x12,
                    divisor: 16
                },
                Record::Subtract {
                    width: Width::Long,
                    offset: 0x14,
                    divisor: 1
                },
            ]
        );
    }

    #[test]
    fn empty_file_has_no_records() {
        assert_eq!(parse_zinfo(&[]).expect("parse"), Vec::new());
    }

    #[test]
    fn rejects_partial_record() {
        let mut data = raw(b"COPY", 0, 1, 1);
        data.push(0);
        let err = parse_zinfo(&data).expect_err("must fail");
        assert_eq!(
            err,
            FormatError::InvalidRecordFile {
                len: RECORD_SIZE + 1,
                record_size: RECORD_SIZE
            }
        );
    }

    #[test]
    fn reports_index_of_unknown_tag() {
        let mut data = raw(b"COPY", 0, 1, 1);
        data.extend(raw(b"ZAP\0", 0, 0, 0));
        let err = parse_zinfo(&data).expect_err("must fail");
        assert_eq!(
            err,
            FormatError::UnknownRecordType {
                index: 1,
                tag: "ZAP".to_string()
            }
        );
        assert_eq!(err.to_string(), "unknown zinfo record type \"ZAP\" at record 1");
    }

    #[test]
    fn tag_match_is_case_sensitive() {
        let data = raw(b"copy", 0, 1, 1);
        assert!(matches!(
            parse_zinfo(&data),
            Err(FormatError::UnknownRecordType { index: 0, .. })
        ));
    }

    #[test]
    fn encoder_writes_wire_layout() {
        let records = [
            Record::Pack {
                offset: 1,
                length: 2,
                align: 4,
            },
            Record::Subtract {
                width: Width::Word,
                offset: 8,
                divisor: 16,
            },
        ];
        let mut expected = raw(b"PACK", 1, 2, 4);
        expected.extend(raw(b"SUBW", 8, 16, 0));
        assert_eq!(encode_zinfo(&records), expected);
        assert_eq!(parse_zinfo(&expected).expect("parse"), records.to_vec());
    }

    #[test]
    fn tag_bytes_match_tag_names() {
        let records = [
            Record::Copy { offset: 0, length: 0, align: 1 },
            Record::Pack { offset: 0, length: 0, align: 1 },
            Record::Subtract { width: Width::Byte, offset: 0, divisor: 1 },
            Record::Subtract { width: Width::Word, offset: 0, divisor: 1 },
            Record::Subtract { width: Width::Long, offset: 0, divisor: 1 },
        ];
        let tags: Vec<[u8; 4]> = records.iter().map(Record::tag).collect();
        assert_eq!(tags, vec![*b"COPY", *b"PACK", *b"SUBB", *b"SUBW", *b"SUBL"]);
        for record in records {
            assert_eq!(record.tag_str().as_bytes(), &record.tag());
        }
    }

    #[test]
    fn displays_record_with_hex_fields() {
        let record = Record::Copy {
            offset: 0x20,
            length: 0x10,
            align: 4,
        };
        assert_eq!(record.to_string(), "COPY offset=0x20 length=0x10 align=0x4");
        let record = Record::Subtract {
            width: Width::Long,
            offset: 0x1c,
            divisor: 512,
        };
        assert_eq!(record.to_string(), "SUBL offset=0x1c divisor=0x200");
    }
}
