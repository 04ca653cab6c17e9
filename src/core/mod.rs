pub mod bundle;
pub mod card;
pub mod codec;
pub mod discovery;
pub mod error;
pub mod jwe;
pub mod jwk;
pub mod jws;
pub mod manifest;
pub mod retrieval;
pub mod uri;
pub mod util;
