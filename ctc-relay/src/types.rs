//! Value types shared by the codec, the addressing protocol and the
//! dispatcher.

use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

/// Address of one board on the chain.
///
/// Address 0 is the broadcast address: every board executes the command,
/// which is only meaningful when exactly one board is connected. Addresses
/// 1..=31 are handed out by chain discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct BoardAddress(u8);

impl BoardAddress {
    pub const BROADCAST: BoardAddress = BoardAddress(0);
    pub const FIRST: BoardAddress = BoardAddress(1);
    pub const MAX: u8 = 31;

    pub fn new(value: u8) -> Result<Self> {
        if value > Self::MAX {
            return Err(Error::InvalidArgument(format!(
                "board address {} out of range 0..={}",
                value,
                Self::MAX
            )));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_broadcast(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for BoardAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the 8 relays on a board, zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RelayIndex(u8);

impl RelayIndex {
    pub const COUNT: u8 = 8;

    pub fn new(value: u8) -> Result<Self> {
        if value >= Self::COUNT {
            return Err(Error::InvalidArgument(format!(
                "relay index {} out of range 0..={}",
                value,
                Self::COUNT - 1
            )));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Bit selecting this relay in a [`RelayBank`].
    pub fn mask(self) -> u8 {
        1 << self.0
    }

    pub fn all() -> impl Iterator<Item = RelayIndex> {
        (0..Self::COUNT).map(RelayIndex)
    }
}

/// On/off state of all 8 relays of one board. Bit *i* is relay *i*.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RelayBank(u8);

impl RelayBank {
    pub fn new(bits: u8) -> Self {
        Self(bits)
    }

    /// Build a bank from a caller-supplied port value, rejecting anything
    /// that does not fit in 8 bits.
    pub fn from_value(value: u32) -> Result<Self> {
        u8::try_from(value).map(Self).map_err(|_| {
            Error::InvalidArgument(format!("port value {} out of range 0..=255", value))
        })
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_on(self, relay: RelayIndex) -> bool {
        self.0 & relay.mask() != 0
    }

    pub fn with(self, relay: RelayIndex) -> Self {
        Self(self.0 | relay.mask())
    }

    pub fn without(self, relay: RelayIndex) -> Self {
        Self(self.0 & !relay.mask())
    }

    pub fn toggled(self, relay: RelayIndex) -> Self {
        Self(self.0 ^ relay.mask())
    }
}

impl fmt::Display for RelayBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// A board found during chain discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoardInfo {
    pub address: BoardAddress,
    /// Firmware version the board reports in its setup acknowledgment
    pub firmware: u8,
}

/// Boards discovered by one `init` run, in physical chain order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChainTable(Vec<BoardInfo>);

impl ChainTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, board: BoardInfo) {
        self.0.push(board);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn boards(&self) -> &[BoardInfo] {
        &self.0
    }

    pub fn addresses(&self) -> Vec<u8> {
        self.0.iter().map(|b| b.address.value()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_range() {
        assert!(BoardAddress::new(0).unwrap().is_broadcast());
        assert_eq!(BoardAddress::new(31).unwrap().value(), 31);
        assert!(matches!(BoardAddress::new(32), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_relay_index_rejects_out_of_range() {
        for i in 0..8 {
            assert_eq!(RelayIndex::new(i).unwrap().mask(), 1 << i);
        }
        assert!(matches!(RelayIndex::new(8), Err(Error::InvalidArgument(_))));
        assert!(matches!(RelayIndex::new(255), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_bank_from_value() {
        assert_eq!(RelayBank::from_value(0xa5).unwrap().bits(), 0xa5);
        assert!(RelayBank::from_value(256).is_err());
    }

    #[test]
    fn test_bank_bit_ops() {
        let r3 = RelayIndex::new(3).unwrap();
        let bank = RelayBank::new(0x01);
        assert!(bank.with(r3).is_on(r3));
        assert_eq!(bank.with(r3).without(r3), bank);
        assert_eq!(bank.toggled(r3).toggled(r3), bank);
        assert_eq!(format!("{}", RelayBank::new(0x0f)), "0x0F");
    }
}
