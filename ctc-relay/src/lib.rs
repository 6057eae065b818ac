//! Control Conrad relay cards over a serial link.
//!
//! Up to 31 cards with 8 relays each can be daisy-chained on one serial
//! port. This crate encodes the cards' 4-byte frames, hands out chain
//! addresses (`init`), and drives single relays or whole ports through a
//! [`Dispatcher`] over any [`Transport`].

pub mod addressing;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod tracing;
pub mod transport;
pub mod types;

pub use addressing::AddressSpec;
pub use dispatcher::{CommandResult, Dispatcher};
pub use error::{Error, Malformed, Result};
pub use protocol::Command;
pub use transport::Transport;
pub use types::{BoardAddress, BoardInfo, ChainTable, RelayBank, RelayIndex};
