//! Tessera Crypto — canonical serialisation, Ed25519 verification, and
//! the Merkle state-root commitment scheme.

pub mod canonical;
pub mod merkle;
pub mod signature;

pub use canonical::signable_bytes;
pub use merkle::{leaf, leaves, merkle_proof, merkle_root, sha256, verify_merkle_proof, MerkleProof};
pub use signature::{verify_intent, SignatureError};
