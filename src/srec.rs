//! Motorola S-Record decoding and relocation.
//!
//! Each line of an image is decoded on its own; a bad line only ever
//! affects itself.

use core::fmt;
use core::str::FromStr;

/// S-Record decoding errors, scoped to a single line
#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum SrecError {
    #[error("record does not start with 'S'")]
    InvalidStart,

    #[error("unknown record type 'S{0}'")]
    UnknownType(char),

    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("byte count 0x{count:02X} does not match {actual} bytes on line")]
    CountMismatch { count: u8, actual: usize },

    #[error("byte count 0x{0:02X} too small for record type")]
    CountTooSmall(u8),

    #[error("checksum mismatch (expected 0x{expected:02X}, found 0x{actual:02X})")]
    Checksum { expected: u8, actual: u8 },

    #[error("address 0x{address:X} offset by {offset} is out of range")]
    AddressOverflow { address: u32, offset: i64 },
}

/// S-Record types
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum RecordType {
    /// S0, vendor specific header
    Header,
    /// S1, data with a 16-bit address
    Data16,
    /// S2, data with a 24-bit address
    Data24,
    /// S3, data with a 32-bit address
    Data32,
    /// S5, 16-bit record count
    Count16,
    /// S6, 24-bit record count
    Count24,
    /// S7, 32-bit start address terminator
    Start32,
    /// S8, 24-bit start address terminator
    Start24,
    /// S9, 16-bit start address terminator
    Start16,
    /// Reserved type digits (S4), treated as a 16-bit address record
    Other(char),
}

impl RecordType {
    fn from_digit(c: char) -> Result<Self, SrecError> {
        let t = match c {
            '0' => RecordType::Header,
            '1' => RecordType::Data16,
            '2' => RecordType::Data24,
            '3' => RecordType::Data32,
            '5' => RecordType::Count16,
            '6' => RecordType::Count24,
            '7' => RecordType::Start32,
            '8' => RecordType::Start24,
            '9' => RecordType::Start16,
            c if c.is_ascii_digit() => RecordType::Other(c),
            _ => return Err(SrecError::UnknownType(c)),
        };
        Ok(t)
    }

    /// Type digit following the leading 'S'
    pub fn digit(&self) -> char {
        match self {
            RecordType::Header => '0',
            RecordType::Data16 => '1',
            RecordType::Data24 => '2',
            RecordType::Data32 => '3',
            RecordType::Count16 => '5',
            RecordType::Count24 => '6',
            RecordType::Start32 => '7',
            RecordType::Start24 => '8',
            RecordType::Start16 => '9',
            RecordType::Other(c) => *c,
        }
    }

    /// Width of the address field in bytes
    pub fn address_width(&self) -> usize {
        match self {
            RecordType::Header
            | RecordType::Data16
            | RecordType::Count16
            | RecordType::Start16
            | RecordType::Other(_) => 2,
            RecordType::Data24 | RecordType::Count24 | RecordType::Start24 => 3,
            RecordType::Data32 | RecordType::Start32 => 4,
        }
    }

    /// Largest address representable by this record type
    pub fn max_address(&self) -> u32 {
        match self.address_width() {
            4 => u32::MAX,
            w => (1u32 << (8 * w as u32)) - 1,
        }
    }
}

/// A single decoded S-Record line
#[derive(Clone, PartialEq, Debug)]
pub struct SRecord {
    pub kind: RecordType,
    /// Byte count field, covering address, payload and checksum
    pub byte_count: u8,
    pub address: u32,
    pub payload: Vec<u8>,
    pub checksum: u8,
}

/// Compute an S-Record checksum, the ones complement of the low byte of the
/// sum of the byte count, address and payload bytes.
pub fn compute_checksum(kind: RecordType, byte_count: u8, address: u32, payload: &[u8]) -> u8 {
    let width = kind.address_width();
    let address_bytes = &address.to_be_bytes()[4 - width..];

    let sum = address_bytes
        .iter()
        .chain(payload.iter())
        .fold(byte_count, |acc, b| acc.wrapping_add(*b));

    !sum
}

/// Check whether a text line is a well-formed S-Record with a matching checksum
pub fn validate_checksum(line: &str) -> bool {
    match SRecord::parse(line) {
        Ok(r) => r.checksum_ok(),
        Err(_) => false,
    }
}

impl SRecord {
    /// Build a record from its parts, filling in byte count and checksum
    pub fn new(kind: RecordType, address: u32, payload: Vec<u8>) -> Self {
        let byte_count = (kind.address_width() + payload.len() + 1) as u8;
        let checksum = compute_checksum(kind, byte_count, address, &payload);

        Self { kind, byte_count, address, payload, checksum }
    }

    /// Decode a single line.
    ///
    /// The shape of the line (leading 'S', type digit, hex fields matching the
    /// byte count) is checked here, the checksum is not. See [`SRecord::validate`].
    pub fn parse(line: &str) -> Result<Self, SrecError> {
        let line = line.trim();
        let mut chars = line.chars();

        if chars.next() != Some('S') {
            return Err(SrecError::InvalidStart);
        }

        let kind = match chars.next() {
            Some(c) => RecordType::from_digit(c)?,
            None => return Err(SrecError::UnknownType(' ')),
        };

        let bytes = hex::decode(chars.as_str())?;

        let byte_count = match bytes.first() {
            Some(c) => *c,
            None => return Err(SrecError::CountMismatch { count: 0, actual: 0 }),
        };

        if bytes.len() != byte_count as usize + 1 {
            return Err(SrecError::CountMismatch {
                count: byte_count,
                actual: bytes.len().saturating_sub(1),
            });
        }

        let width = kind.address_width();
        if (byte_count as usize) < width + 1 {
            return Err(SrecError::CountTooSmall(byte_count));
        }

        let address = bytes[1..1 + width]
            .iter()
            .fold(0u32, |acc, b| (acc << 8) | *b as u32);

        let payload = bytes[1 + width..bytes.len() - 1].to_vec();
        let checksum = bytes[bytes.len() - 1];

        Ok(Self { kind, byte_count, address, payload, checksum })
    }

    /// Recompute the checksum from the record fields
    pub fn computed_checksum(&self) -> u8 {
        compute_checksum(self.kind, self.byte_count, self.address, &self.payload)
    }

    pub fn checksum_ok(&self) -> bool {
        self.computed_checksum() == self.checksum
    }

    /// Check the stored checksum against the record contents
    pub fn validate(&self) -> Result<(), SrecError> {
        let expected = self.computed_checksum();
        if expected != self.checksum {
            return Err(SrecError::Checksum { expected, actual: self.checksum });
        }
        Ok(())
    }

    /// Length of the data carried by the record, i.e. the byte count without
    /// the address and checksum bytes.
    pub fn data_length(&self) -> u8 {
        self.byte_count
            .saturating_sub(self.kind.address_width() as u8 + 1)
    }
}

impl FromStr for SRecord {
    type Err = SrecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.kind.address_width() * 2;
        write!(
            f,
            "S{}{:02X}{:0digits$X}{}{:02X}",
            self.kind.digit(),
            self.byte_count,
            self.address,
            hex::encode_upper(&self.payload),
            self.checksum,
            digits = digits
        )
    }
}

/// Offsets applied to records before they are programmed
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct Relocation {
    /// Added to the record address, must stay within the record's address width
    pub address_offset: i64,
    /// Added (wrapping) to every payload byte
    pub data_offset: u8,
}

impl Relocation {
    pub fn new(address_offset: i64, data_offset: u8) -> Self {
        Self { address_offset, data_offset }
    }

    pub fn is_identity(&self) -> bool {
        self.address_offset == 0 && self.data_offset == 0
    }

    /// Apply the offsets to a record, regenerating its checksum
    pub fn apply(&self, record: &SRecord) -> Result<SRecord, SrecError> {
        let address = record.address as i64 + self.address_offset;
        if address < 0 || address > record.kind.max_address() as i64 {
            return Err(SrecError::AddressOverflow {
                address: record.address,
                offset: self.address_offset,
            });
        }
        let address = address as u32;

        let payload: Vec<u8> = record
            .payload
            .iter()
            .map(|b| b.wrapping_add(self.data_offset))
            .collect();

        let checksum = compute_checksum(record.kind, record.byte_count, address, &payload);

        Ok(SRecord {
            kind: record.kind,
            byte_count: record.byte_count,
            address,
            payload,
            checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &str = "S11300002850000021000100000000000000000052";
    const HEADER: &str = "S00600004844521B";
    const END: &str = "S9030000FC";

    #[test]
    fn parse_data_record() {
        let r = SRecord::parse(DATA).unwrap();

        assert_eq!(r.kind, RecordType::Data16);
        assert_eq!(r.byte_count, 0x13);
        assert_eq!(r.address, 0x0000);
        assert_eq!(r.payload.len(), 16);
        assert_eq!(&r.payload[..4], &[0x28, 0x50, 0x00, 0x00]);
        assert_eq!(r.checksum, 0x52);
        assert!(r.checksum_ok());
        assert!(validate_checksum(DATA));
    }

    #[test]
    fn parse_header_and_terminator() {
        let h = SRecord::parse(HEADER).unwrap();
        assert_eq!(h.kind, RecordType::Header);
        assert_eq!(h.payload, b"HDR".to_vec());
        assert!(h.checksum_ok());

        let e: SRecord = END.parse().unwrap();
        assert_eq!(e.kind, RecordType::Start16);
        assert!(e.payload.is_empty());
        assert!(e.checksum_ok());
    }

    #[test]
    fn parse_wide_addresses() {
        let r = SRecord::new(RecordType::Data32, 0x0800_1000, vec![1, 2, 3]);
        let text = r.to_string();
        assert_eq!(&text[..12], "S30808001000");

        let p = SRecord::parse(&text).unwrap();
        assert_eq!(p, r);
        assert!(p.checksum_ok());
    }

    #[test]
    fn corrupt_checksum_fails() {
        let bad = format!("{}00", &DATA[..DATA.len() - 2]);
        assert!(!validate_checksum(&bad));

        let r = SRecord::parse(&bad).unwrap();
        assert_eq!(
            r.validate(),
            Err(SrecError::Checksum { expected: 0x52, actual: 0x00 })
        );
    }

    #[test]
    fn checksum_bit_flips_fail() {
        for line in &[DATA, HEADER, END] {
            let r = SRecord::parse(line).unwrap();
            assert!(validate_checksum(&r.to_string()));

            for bit in 0..8 {
                let mut flipped = r.clone();
                flipped.checksum ^= 1 << bit;

                let text = flipped.to_string();
                assert!(!validate_checksum(&text), "{} passed", text);
            }
        }
    }

    #[test]
    fn malformed_lines() {
        assert_eq!(SRecord::parse("X1030000FC"), Err(SrecError::InvalidStart));
        assert_eq!(SRecord::parse("SX030000FC"), Err(SrecError::UnknownType('X')));
        assert_eq!(SRecord::parse("S"), Err(SrecError::UnknownType(' ')));
        assert!(matches!(SRecord::parse("S1030000F"), Err(SrecError::Hex(_))));
        assert!(matches!(SRecord::parse("S10300ZZFC"), Err(SrecError::Hex(_))));
        assert_eq!(
            SRecord::parse("S1050000FC"),
            Err(SrecError::CountMismatch { count: 5, actual: 3 })
        );
        assert_eq!(SRecord::parse("S102FFFF"), Err(SrecError::CountTooSmall(2)));
        assert!(!validate_checksum(""));
    }

    #[test]
    fn parse_reserved_type() {
        let r = SRecord::parse("S4030000FC").unwrap();
        assert_eq!(r.kind, RecordType::Other('4'));
        assert_eq!(r.address, 0);
        assert!(r.checksum_ok());
        assert_eq!(r.to_string(), "S4030000FC");
    }

    #[test]
    fn data_length_excludes_address_and_checksum() {
        for count in 3..=255usize {
            let r = SRecord::new(RecordType::Data16, 0x1000, vec![0xAA; count - 3]);
            assert_eq!(r.byte_count as usize, count);
            assert_eq!(format!("{:02X}", r.data_length()), format!("{:02X}", count - 3));
        }
    }

    #[test]
    fn zero_relocation_is_identity() {
        let r = SRecord::parse(DATA).unwrap();
        let relocation = Relocation::default();
        assert!(relocation.is_identity());

        let o = relocation.apply(&r).unwrap();
        assert_eq!(o, r);
        assert_eq!(o.to_string(), DATA);
    }

    #[test]
    fn relocation_regenerates_checksum() {
        let r = SRecord::parse(DATA).unwrap();

        let o = Relocation::new(0x4000, 0).apply(&r).unwrap();
        assert_eq!(o.address, 0x4000);
        assert_eq!(o.payload, r.payload);
        assert_ne!(o.checksum, r.checksum);
        assert!(o.checksum_ok());
        assert!(validate_checksum(&o.to_string()));

        let o = Relocation::new(0, 1).apply(&r).unwrap();
        assert_eq!(o.payload[0], 0x29);
        assert!(o.checksum_ok());
    }

    #[test]
    fn relocation_out_of_range() {
        let r = SRecord::new(RecordType::Data16, 0xFFF0, vec![0; 4]);

        assert_eq!(
            Relocation::new(0x20, 0).apply(&r),
            Err(SrecError::AddressOverflow { address: 0xFFF0, offset: 0x20 })
        );
        assert_eq!(
            Relocation::new(-0x10000, 0).apply(&r),
            Err(SrecError::AddressOverflow { address: 0xFFF0, offset: -0x10000 })
        );
        assert_eq!(Relocation::new(-0xFFF0, 0).apply(&r).unwrap().address, 0);
    }
}
