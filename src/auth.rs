//! Auth-domain identifiers, registered clients, key records, and issued grant/token models.

pub mod client;
pub mod id;
pub mod key;
pub mod scope;
pub mod token;
pub mod trusted;

pub use client::*;
pub use id::*;
pub use key::*;
pub use scope::*;
pub use token::{grant::*, pair::*, secret::*};
pub use trusted::*;
