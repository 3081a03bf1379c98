//! Tandem Wallet
//!
//! The device participant. A [`DeviceWallet`] connects to a coordinator for
//! each operation, runs the device role of DKG or signing over that
//! connection, and distributes backup fragments after key creation so the
//! key can later be rebuilt with [`DeviceWallet::recover_key`].

pub mod connection;
pub mod error;
pub mod wallet;

pub use connection::{
    connect_to_coordinator, random_session_id, ConnectOptions, CoordinatorConnection,
    SESSION_ID_BYTES,
};
pub use error::{WalletError, WalletResult};
pub use wallet::{
    CreateKeyOptions, CreatedKey, DeviceWallet, SignBytesOptions, WalletOptions, WalletSignature,
};
