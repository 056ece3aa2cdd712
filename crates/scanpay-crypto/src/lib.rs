// Scanpay Crypto - signing and identifier primitives for the scan-to-pay server

pub mod hash;
pub mod jcs;
pub mod keys;
pub mod reference;
pub mod token;

pub use hash::{hash_secret, secret_matches};
pub use jcs::jcs_canonical_bytes;
pub use keys::{generate_keypair, signing_key_from_hex, signing_key_to_hex};
pub use reference::{generate_device_secret, generate_public_id, generate_reference};
pub use token::{
    sign_access_token, sign_link_token, sign_token, verify_access_token, verify_link_token,
    verify_token, TokenClaims,
};
