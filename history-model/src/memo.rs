//! Kin binary memo
//!
//! Transactions attribute themselves to a registered application through a
//! 32 byte memo stored in the Stellar `MEMO_HASH` slot.
//!
//! # Bit layout (little-endian bit order within the 256 bits)
//!
//! | bits      | field            |
//! |-----------|------------------|
//! | 0..2      | magic (`0b01`)   |
//! | 2..5      | version          |
//! | 5..10     | transaction type |
//! | 10..26    | app index (u16)  |
//! | 26..256   | foreign key      |

use crate::error::{Error, Result};
use stellar_xdr::curr::Memo;

/// Memo length
pub const MEMO_LEN: usize = 32;

/// Foreign key length (230 usable bits)
pub const FOREIGN_KEY_LEN: usize = 29;

const MAGIC: u8 = 0x1;

/// Highest memo version accepted by strict validation
pub const MAX_STRICT_VERSION: u8 = 1;

/// Kin transaction type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionType {
    /// No type
    None,
    /// App pays a user
    Earn,
    /// User pays an app
    Spend,
    /// User pays a user
    P2P,
    /// Any other 5 bit value
    Unknown(u8),
}

impl TransactionType {
    fn from_bits(bits: u8) -> Self {
        match bits {
            0 => TransactionType::None,
            1 => TransactionType::Earn,
            2 => TransactionType::Spend,
            3 => TransactionType::P2P,
            other => TransactionType::Unknown(other),
        }
    }

    fn bits(self) -> u8 {
        match self {
            TransactionType::None => 0,
            TransactionType::Earn => 1,
            TransactionType::Spend => 2,
            TransactionType::P2P => 3,
            TransactionType::Unknown(b) => b,
        }
    }
}

/// 32 byte Kin memo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KinMemo([u8; MEMO_LEN]);

impl KinMemo {
    /// Encode a memo
    pub fn new(
        version: u8,
        tx_type: TransactionType,
        app_index: u16,
        foreign_key: &[u8],
    ) -> Result<Self> {
        if version > 7 {
            return Err(Error::InvalidArgument(format!(
                "memo version {} does not fit in 3 bits",
                version
            )));
        }
        if tx_type.bits() > 31 {
            return Err(Error::InvalidArgument(format!(
                "transaction type {} does not fit in 5 bits",
                tx_type.bits()
            )));
        }
        if foreign_key.len() > FOREIGN_KEY_LEN {
            return Err(Error::InvalidArgument(format!(
                "foreign key too long: {} bytes",
                foreign_key.len()
            )));
        }

        let mut fk = [0u8; FOREIGN_KEY_LEN];
        fk[..foreign_key.len()].copy_from_slice(foreign_key);

        let t = tx_type.bits();
        let mut m = [0u8; MEMO_LEN];
        m[0] = MAGIC | (version << 2) | ((t & 0x7) << 5);
        m[1] = ((t >> 3) & 0x3) | (((app_index & 0x3f) as u8) << 2);
        m[2] = ((app_index >> 6) & 0xff) as u8;
        m[3] = ((app_index >> 14) & 0x3) as u8 | (fk[0] << 2);
        for i in 4..MEMO_LEN {
            m[i] = ((fk[i - 4] >> 6) & 0x3) | (fk[i - 3] << 2);
        }

        Ok(Self(m))
    }

    /// Wrap raw memo bytes
    pub fn from_bytes(bytes: [u8; MEMO_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw memo bytes
    pub fn as_bytes(&self) -> &[u8; MEMO_LEN] {
        &self.0
    }

    /// Memo format version
    pub fn version(&self) -> u8 {
        (self.0[0] >> 2) & 0x7
    }

    /// Transaction type
    pub fn transaction_type(&self) -> TransactionType {
        TransactionType::from_bits((self.0[0] >> 5) | ((self.0[1] & 0x3) << 3))
    }

    /// Index of the application that owns the transaction
    pub fn app_index(&self) -> u16 {
        let mut a = u16::from(self.0[1]) >> 2;
        a |= u16::from(self.0[2]) << 6;
        a |= u16::from(self.0[3] & 0x3) << 14;
        a
    }

    /// Foreign key; the last byte only carries 6 bits
    pub fn foreign_key(&self) -> [u8; FOREIGN_KEY_LEN] {
        let mut fk = [0u8; FOREIGN_KEY_LEN];
        for i in 0..FOREIGN_KEY_LEN - 1 {
            fk[i] = (self.0[i + 3] >> 2) | ((self.0[i + 4] & 0x3) << 6);
        }
        fk[FOREIGN_KEY_LEN - 1] = self.0[MEMO_LEN - 1] >> 2;
        fk
    }

    /// Magic bits match
    pub fn is_valid(&self) -> bool {
        self.0[0] & 0x3 == MAGIC
    }

    /// Magic bits match, version is known and the type is defined
    pub fn is_valid_strict(&self) -> bool {
        self.is_valid()
            && self.version() <= MAX_STRICT_VERSION
            && !matches!(self.transaction_type(), TransactionType::Unknown(_))
    }

    /// Extract a Kin memo from a Stellar memo, if it holds one
    pub fn from_xdr(memo: &Memo, strict: bool) -> Option<Self> {
        let hash = match memo {
            Memo::Hash(h) => h,
            _ => return None,
        };

        let m = Self(hash.0);
        let ok = if strict { m.is_valid_strict() } else { m.is_valid() };
        ok.then_some(m)
    }

    /// Stellar memo holding this Kin memo
    pub fn to_xdr(&self) -> Memo {
        Memo::Hash(stellar_xdr::curr::Hash(self.0))
    }
}
