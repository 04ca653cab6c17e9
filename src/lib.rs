//! This library decodes and verifies [SMART Health Cards] and [SMART Health Links].
//!
//! [SMART Health Cards]: <https://spec.smarthealth.cards/>
//! [SMART Health Links]: <https://docs.smarthealthit.org/smart-health-links/spec/>
//!
//! # Usage
//!
//! Resolution is performed by a [`Resolver`], built around an [`AsyncHttpClient`] that plays
//! the role of the retrieval gateway:
//!
//! ```ignore
//! use std::sync::Arc;
//! use smart_health_artifacts::{
//!     config::ResolverConfig,
//!     core::util::ReqwestClient,
//!     resolver::Resolver,
//! };
//!
//! let resolver = Resolver::builder()
//!     .with_client(Arc::new(ReqwestClient::new()?))
//!     .with_config(ResolverConfig {
//!         recipient: "https://viewer.example".into(),
//!         ..Default::default()
//!     })
//!     .build()?;
//!
//! // A Health Card scanned from a QR code.
//! let card = resolver.resolve_card("shc:/5676290952432060346029243740...").await?;
//! if !card.verified {
//!     // The data can be shown, but its issuer is unconfirmed.
//! }
//!
//! // A passcode protected Health Link.
//! let link = resolver.resolve_link("shlink:/eyJ1cmwiOi...", Some("1234")).await?;
//! println!("{:?}: {} credential(s)", link.label, link.shc.len());
//! ```
//!
//! The HTTP behavior can be customized by implementing the [`AsyncHttpClient`] trait.
//!
//! [`Resolver`]: crate::resolver::Resolver
//! [`AsyncHttpClient`]: crate::core::util::AsyncHttpClient
//!
//! # Pipeline Overview
//!
//! ## Health Links
//!
//! 1. *Parsing*: the `shlink:/` prefix is stripped and the base64url manifest decoded into a
//!    [`LinkManifest`]. A manifest without `url` fails before any request is made.
//! 2. *Retrieving*: links flagged `U` are fetched with a `GET`, all others with a `POST`
//!    carrying the recipient and, for links flagged `P`, the passcode.
//! 3. *Decrypting*: every embedded `application/smart-health-card` file is a direct-key JWE
//!    whose plaintext lists `verifiableCredential` strings.
//!
//! ## Health Cards
//!
//! 4. *Decoding*: the payload segment is inflated and parsed for its FHIR bundle.
//! 5. *Verifying*: the issuer's keys are discovered at `<iss>/.well-known/jwks` and the ES256
//!    signature is checked. A bad signature does not fail the resolution; it only clears
//!    [`ResolvedBundle::verified`].
//!
//! Every other failure aborts the resolution with an [`Error`].
//!
//! [`LinkManifest`]: crate::core::manifest::LinkManifest
//! [`ResolvedBundle::verified`]: crate::core::bundle::ResolvedBundle::verified
//! [`Error`]: crate::core::error::Error
//!
//! # Persistence
//!
//! The resolver keeps no session state. Callers persist [`ResolvedBundle`]s through a
//! [`BundleStore`] and rebuild them offline with [`Resolver::replay`].
//!
//! [`ResolvedBundle`]: crate::core::bundle::ResolvedBundle
//! [`BundleStore`]: crate::store::BundleStore
//! [`Resolver::replay`]: crate::resolver::Resolver::replay

pub mod config;
pub mod core;
pub mod resolver;
pub mod store;
pub mod utils;
