pub mod jwt;
pub mod middleware;
pub mod verifier;

pub use verifier::{CredentialVerifier, JwtCredentialVerifier, VerifiedUser};
