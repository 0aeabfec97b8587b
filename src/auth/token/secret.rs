//! Codes and bearer tokens, kept out of logs except in obfuscated form.

// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::_prelude::*;

/// Characters in a freshly minted code or token.
pub const TOKEN_LEN: usize = 32;

/// Authorization code, access token, or refresh token value.
///
/// [`Display`] and [`Debug`] render [`obfuscate`]d text; use [`TokenSecret::expose`] to reach the
/// raw value.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps an existing value.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Mints a random alphanumeric value of [`TOKEN_LEN`] characters.
	pub fn generate() -> Self {
		Self(rand::rng().sample_iter(Alphanumeric).take(TOKEN_LEN).map(char::from).collect())
	}

	/// Raw value.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&obfuscate(&self.0))
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "TokenSecret({})", obfuscate(&self.0))
	}
}

/// Log-safe rendering of a credential: `****` plus its last four characters, or `--` when the
/// value is too short to reveal any of it.
pub fn obfuscate(raw: &str) -> String {
	match raw.char_indices().rev().nth(4) {
		Some(_) => {
			let tail = raw.char_indices().rev().nth(3).map_or(raw, |(i, _)| &raw[i..]);

			format!("****{tail}")
		},
		None => "--".into(),
	}
}
