//! Data structures describing the monitored on-chain programs.

use std::fmt;

use thiserror::Error;

/// Address of the signature-verification program whose presence in a
/// transaction's account keys marks the payload as co-signed. Overridable
/// via `SECP_PROGRAM`.
pub const SECP_VERIFY_PROGRAM: &str = "KeccakSecp256k11111111111111111111111111111";

/// Byte length of a decoded program address.
pub const ADDRESS_LEN: usize = 32;

/// Errors emitted when a supplied program address fails validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressFormatError {
    #[error("program address is not valid base58")]
    NotBase58,
    #[error("program address decodes to {0} bytes, expected {ADDRESS_LEN}")]
    WrongLength(usize),
    #[error("unknown program kind `{0}`")]
    UnknownKind(String),
}

/// A base58 program address validated to decode to exactly 32 bytes.
///
/// Validation happens once at construction; ledger responses are compared
/// against the stored string form, which base58 keeps canonical.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramAddress(String);

impl ProgramAddress {
    pub fn parse(address: &str) -> Result<Self, AddressFormatError> {
        let decoded = bs58::decode(address)
            .into_vec()
            .map_err(|_| AddressFormatError::NotBase58)?;
        if decoded.len() != ADDRESS_LEN {
            return Err(AddressFormatError::WrongLength(decoded.len()));
        }
        Ok(Self(address.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ProgramAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which of the known on-chain programs an address refers to; selects the
/// payload layout the decoder applies to matching instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramKind {
    /// The registry program; instructions carry the structured
    /// user/track/source payload.
    Registry,
    /// The combined create-and-verify program; instructions anchor a
    /// free-text signed message.
    CreateAndVerify,
    /// Any other address supplied by the operator; treated as a free-text
    /// signed message.
    Custom,
}

impl ProgramKind {
    pub fn parse(kind: &str) -> Result<Self, AddressFormatError> {
        match kind {
            "registry" => Ok(Self::Registry),
            "create-and-verify" => Ok(Self::CreateAndVerify),
            "custom" => Ok(Self::Custom),
            other => Err(AddressFormatError::UnknownKind(other.to_owned())),
        }
    }

    pub fn payload_format(&self) -> PayloadFormat {
        match self {
            Self::Registry => PayloadFormat::TrackData,
            Self::CreateAndVerify | Self::Custom => PayloadFormat::SignedMessage,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::CreateAndVerify => "create-and-verify",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ProgramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload layout carried by a program's instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    /// 65-byte recoverable-signature header followed by UTF-8 text.
    SignedMessage,
    /// Length-prefixed user/track/source fields behind fixed pads.
    TrackData,
}

/// One watched program, supplied at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredProgram {
    pub address: ProgramAddress,
    pub kind: ProgramKind,
}

impl MonitoredProgram {
    pub fn new(address: ProgramAddress, kind: ProgramKind) -> Self {
        Self { address, kind }
    }

    /// Parses one `MONITORED_PROGRAMS` entry of the form `address` or
    /// `address:kind`. Base58 never contains `:`, so the split is
    /// unambiguous.
    pub fn parse(entry: &str) -> Result<Self, AddressFormatError> {
        let (address, kind) = match entry.split_once(':') {
            Some((address, kind)) => (address, ProgramKind::parse(kind.trim())?),
            None => (entry, ProgramKind::Custom),
        };
        Ok(Self {
            address: ProgramAddress::parse(address.trim())?,
            kind,
        })
    }
}
