//! Share files securely through an untrusted blob store.
//!
//! **secretshare** is a library and pair of applications for transferring
//! a file from a sender to a receiver through a public blob store that is
//! never trusted with the plaintext. It provides:
//!
//! # Core Features
//!
//! * **Streaming encryption**: files of any size are encrypted and
//!   decrypted through a pull-based pipeline without ever being held in
//!   memory
//! * **Content addressing**: the blob name is derived from the transfer
//!   key, so holding the key is the only capability that matters
//! * **Brokered uploads**: a small service mints short-lived presigned
//!   PUT URLs to clients that present a shared authorization secret
//!
//! # Architecture
//!
//! The library is organized into several key modules:
//!
//! * **Codec**
//!   - [`encrypt`]: streaming encrypter and the container format
//!   - [`decrypt`]: streaming decrypter and the one-shot buffer variant
//!
//! * **Keys**
//!   - [`key`]: transfer keys and content-address derivation
//!   - [`encoding`]: the human-friendly share alphabet
//!
//! * **Transfer**
//!   - [`client`]: send and receive orchestration
//!   - [`http`]: HTTP client construction
//!   - [`progress`]: progress sinks for frontends
//!
//! * **Service**
//!   - [`broker`]: the authorization and URL-minting service
//!   - [`s3`]: SigV4 presigning against S3-compatible stores
//!
//! * **Surface**
//!   - [`config`]: persisted client configuration
//!   - [`protocol`]: wire types shared by client and broker
//!   - [`error`]: error types and handling
//!
//! # Example
//!
//! ```rust,no_run
//! use secretshare::client::Client;
//!
//! async fn example() -> secretshare::error::Result<()> {
//!     let client = Client::new(
//!         "https://broker.example.com",
//!         "shares",
//!         "us-west-1",
//!         "shared auth secret",
//!     )?;
//!
//!     let receipt = client.send("notes.txt".as_ref(), 240, None).await?;
//!     println!("key: {}", receipt.key);
//!     Ok(())
//! }
//! ```
//!
//! # Security Model
//!
//! The transfer key is the sole secret: it decrypts the blobs and derives
//! their name. The broker holds only the shared authorization secret and
//! the cloud credentials; it never sees a transfer key. The on-wire
//! container is CBC without a MAC — a wire-compatibility property of the
//! format, carried deliberately.
//!
//! # Error Handling
//!
//! Errors are handled through the types in the [`error`] module, with
//! most functions returning [`Result`](error::Result).

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![doc(test(attr(ignore)))]

#[macro_use]
extern crate log;

pub mod broker;
pub mod client;
pub mod config;
pub mod decrypt;
pub mod encoding;
pub mod encrypt;
pub mod error;
pub mod http;
pub mod key;
pub mod progress;
pub mod protocol;
pub mod s3;

pub use key::TransferKey;
