//! Cryptographic collaborators.
//!
//! The agent never implements primitives itself: symmetric ciphers and digests go through
//! [`DeviceAuthority`], CSR creation through [`CsrGenerator`]. Recipe signatures are
//! checked with the `rsa` crate.

pub mod authority;
pub mod csr;
pub mod signature;

pub use authority::{CipherMode, DeviceAuthority, SoftwareAuthority};
pub use csr::{CsrBundle, CsrGenerator, CsrInstructions};
pub use signature::verify_recipe_signature;
