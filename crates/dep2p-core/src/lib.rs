//! # dep2p-core
//!
//! Identity, address, realm-id, and protocol-id data model shared by every
//! other dep2p crate. Nothing in this crate touches a socket; it is pure
//! parsing, derivation, and comparison logic so it can be unit-tested
//! without any async runtime.
//!
//! ## Key types
//!
//! - [`NodeId`]: 32-byte peer identifier with Kademlia-style XOR distance.
//! - [`KeyPair`]: long-term Ed25519/ECDSA-P256 identity key.
//! - [`Address`]: layered multiaddr-style transport address.
//! - [`RealmKey`] / [`RealmId`]: PSK and its two-level-hash derived id.
//! - [`ProtocolId`]: `/dep2p/sys/...` and `/dep2p/app/<realm>/...` ids.

pub mod address;
pub mod error;
pub mod keypair;
pub mod node_id;
pub mod protocol_id;
pub mod realm_id;

pub use address::{Address, AddressComponent, AddressError, AddressKind};
pub use error::{CoreError, CoreResult};
pub use keypair::{KeyPair, KeyType};
pub use node_id::NodeId;
pub use protocol_id::{ProtocolId, ProtocolNamespace};
pub use realm_id::{derive_realm_id, no_realm_id, RealmId, RealmKey, NO_REALM_NAME};
