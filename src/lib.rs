use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;
use tracing::{debug, trace};

pub mod cli;

/// Magic number at offset 0 of every BFACS file.
pub const BFACS_MAGIC: u32 = 0x9219_0824;
/// Size of the fixed on-disk header.
pub const HEADER_SIZE: usize = 35;
/// Largest IV and cipher block size the format allows.
pub const MAX_BLOCK_SIZE: usize = 16;
/// Supported major version (high byte of the version field).
pub const SUPPORTED_MAJOR_VERSION: u16 = 1;

/// Length of the key-derivation salt stored in the header.
pub const SALT_LEN: usize = 11;
/// Length of the key verification tag stored in the header.
pub const KEY_CHECK_LEN: usize = 4;

// Enough ciphertext to decrypt the encrypted magic, even for stream modes.
const MIN_LEAD_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStage {
    Header,
    Iv,
    LeadBlock,
}

impl fmt::Display for ReadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadStage::Header => write!(f, "file header"),
            ReadStage::Iv => write!(f, "IV"),
            ReadStage::LeadBlock => write!(f, "first ciphertext block"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to open: {0}")]
    Open(#[source] io::Error),
    #[error("failed to read {stage}: {source}")]
    Read {
        stage: ReadStage,
        #[source]
        source: io::Error,
    },
    #[error("short read while trying to read {0}")]
    ShortRead(ReadStage),
    #[error("not a BFACS file, incorrect magic. Expected 0x{expected:08x}, got 0x{found:08x}", expected = BFACS_MAGIC)]
    BadMagic { found: u32 },
    #[error("unsupported BFACS version number {0}")]
    UnsupportedVersion(u16),
    #[error("mismatched IV & block sizes (IV size {iv_size}, block size {block_size})")]
    SizeMismatch { iv_size: u16, block_size: u16 },
    #[error("invalid IV size {0}. Maximum valid is {max}", max = MAX_BLOCK_SIZE)]
    InvalidIvSize(u16),
    #[error("invalid block size {0}. Maximum valid is {max}", max = MAX_BLOCK_SIZE)]
    InvalidBlockSize(u16),
}

/// The fixed 35-byte header at the start of a BFACS file.
///
/// Decoded field by field as little-endian, so the host's struct layout
/// and byte order never matter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub magic: u32,
    pub header_size: u16,
    pub version: u16,
    pub datalen_lo: u32,
    pub datalen_hi: u32,
    pub iv_size: u16,
    pub block_size: u16,
    pub salt: [u8; SALT_LEN],
    pub key_check: [u8; KEY_CHECK_LEN],
}

impl FileHeader {
    pub fn parse(raw: &[u8; HEADER_SIZE]) -> Self {
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&raw[20..31]);
        let mut key_check = [0u8; KEY_CHECK_LEN];
        key_check.copy_from_slice(&raw[31..35]);

        FileHeader {
            magic: LittleEndian::read_u32(&raw[0..4]),
            header_size: LittleEndian::read_u16(&raw[4..6]),
            version: LittleEndian::read_u16(&raw[6..8]),
            datalen_lo: LittleEndian::read_u32(&raw[8..12]),
            datalen_hi: LittleEndian::read_u32(&raw[12..16]),
            iv_size: LittleEndian::read_u16(&raw[16..18]),
            block_size: LittleEndian::read_u16(&raw[18..20]),
            salt,
            key_check,
        }
    }

    pub fn major_version(&self) -> u16 {
        self.version >> 8
    }

    /// Length of the plaintext stored in the archive.
    pub fn plaintext_len(&self) -> u64 {
        (u64::from(self.datalen_hi) << 32) | u64::from(self.datalen_lo)
    }

    /// Checks run in a fixed order; the first failure wins.
    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.magic != BFACS_MAGIC {
            return Err(ExtractError::BadMagic { found: self.magic });
        }
        if self.major_version() != SUPPORTED_MAJOR_VERSION {
            return Err(ExtractError::UnsupportedVersion(self.version));
        }
        if self.block_size > 1 && self.block_size != self.iv_size {
            return Err(ExtractError::SizeMismatch {
                iv_size: self.iv_size,
                block_size: self.block_size,
            });
        }
        if usize::from(self.iv_size) > MAX_BLOCK_SIZE {
            return Err(ExtractError::InvalidIvSize(self.iv_size));
        }
        if usize::from(self.block_size) > MAX_BLOCK_SIZE {
            return Err(ExtractError::InvalidBlockSize(self.block_size));
        }
        Ok(())
    }
}

fn lead_len(block_size: u16) -> usize {
    usize::from(block_size).max(MIN_LEAD_LEN)
}

/// Fill `buf` completely. Running out of input is a short read, anything
/// else the reader reports is a read failure.
fn read_stage<R: Read>(reader: &mut R, buf: &mut [u8], stage: ReadStage) -> Result<(), ExtractError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(source) => return Err(ExtractError::Read { stage, source }),
        }
    }
    trace!(%stage, wanted = buf.len(), got = filled, "read");

    if filled < buf.len() {
        return Err(ExtractError::ShortRead(stage));
    }
    Ok(())
}

#[derive(Debug)]
pub struct BfacsHashExtractor {
    header: FileHeader,
    iv: [u8; MAX_BLOCK_SIZE],
    lead_block: [u8; MAX_BLOCK_SIZE],
}

impl BfacsHashExtractor {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ExtractError> {
        let file = File::open(path).map_err(ExtractError::Open)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, ExtractError> {
        let mut raw = [0u8; HEADER_SIZE];
        read_stage(&mut reader, &mut raw, ReadStage::Header)?;

        let header = FileHeader::parse(&raw);
        debug!(
            magic = header.magic,
            header_size = header.header_size,
            version = header.version,
            plaintext_len = header.plaintext_len(),
            iv_size = header.iv_size,
            block_size = header.block_size,
            "decoded header"
        );
        header.validate()?;

        let mut iv = [0u8; MAX_BLOCK_SIZE];
        let iv_len = usize::from(header.iv_size);
        if iv_len > 0 {
            read_stage(&mut reader, &mut iv[..iv_len], ReadStage::Iv)?;
        }

        let mut lead_block = [0u8; MAX_BLOCK_SIZE];
        let lead = lead_len(header.block_size);
        read_stage(&mut reader, &mut lead_block[..lead], ReadStage::LeadBlock)?;

        Ok(BfacsHashExtractor {
            header,
            iv,
            lead_block,
        })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn lead_len(&self) -> usize {
        lead_len(self.header.block_size)
    }

    pub fn iv(&self) -> &[u8] {
        &self.iv[..usize::from(self.header.iv_size)]
    }

    pub fn lead_block(&self) -> &[u8] {
        &self.lead_block[..self.lead_len()]
    }

    pub fn format_hash(&self) -> String {
        format!(
            "$bfacs$1*{}*{}*{}*{}*{}",
            self.header.block_size,
            hex::encode(self.header.salt),
            hex::encode(self.header.key_check),
            hex::encode(self.iv()),
            hex::encode(self.lead_block()),
        )
    }
}

/// Extract one file. The hash line goes to `out`, or a single
/// `<filename>: <error>` line goes to `diag`; never both.
///
/// Returns whether a hash was written. The `Err` case only covers failures
/// writing to `out` or `diag` themselves.
pub fn process_file<W: Write, E: Write>(
    path: &Path,
    show_filename: bool,
    out: &mut W,
    diag: &mut E,
) -> io::Result<bool> {
    debug!(filename = %path.display(), "processing");
    let filename = path.display();

    match BfacsHashExtractor::from_file(path) {
        Ok(extractor) => {
            let hash = extractor.format_hash();
            if show_filename {
                writeln!(out, "{filename}:{hash}")?;
            } else {
                writeln!(out, "{hash}")?;
            }
            Ok(true)
        }
        Err(e) => {
            writeln!(diag, "{filename}: {e}")?;
            Ok(false)
        }
    }
}
