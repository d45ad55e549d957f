/*
[INPUT]:  API credentials and login responses
[OUTPUT]: Signed login payloads and per-connection handshake state
[POS]:    Auth layer - private channel authentication
[UPDATE]: When auth flow or signature methods change
*/

pub mod credentials;
pub mod handshake;
pub mod signer;

pub use credentials::Credentials;
pub use handshake::{AuthHandshake, AuthReply, AuthStep};
pub use signer::HmacSigner;
