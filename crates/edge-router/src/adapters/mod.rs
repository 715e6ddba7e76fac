//! Adapters for the outbound ports.

mod static_verifier;

pub use static_verifier::StaticCredentialVerifier;
