//! Identifiers for clients, organizations, APIs, and policies.
//!
//! Each is an immutable shared string: identifiers are cloned into every grant, refresh token,
//! and key record, and end up inside storage keys, so whitespace and control characters are
//! rejected up front.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

/// Longest identifier accepted, in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 255;

/// Why an identifier was rejected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// Nothing was supplied.
	#[error("{kind} identifier is blank.")]
	Blank {
		/// Identifier kind.
		kind: &'static str,
	},
	/// A whitespace or control character was found.
	#[error("{kind} identifier contains a whitespace or control character at byte {index}.")]
	IllegalCharacter {
		/// Identifier kind.
		kind: &'static str,
		/// Byte offset of the offending character.
		index: usize,
	},
	/// Longer than [`MAX_IDENTIFIER_LEN`].
	#[error("{kind} identifier is {len} bytes long; the limit is {MAX_IDENTIFIER_LEN}.")]
	TooLong {
		/// Identifier kind.
		kind: &'static str,
		/// Actual length in bytes.
		len: usize,
	},
}

fn check(kind: &'static str, raw: &str) -> Result<(), IdentifierError> {
	if raw.is_empty() {
		return Err(IdentifierError::Blank { kind });
	}
	if raw.len() > MAX_IDENTIFIER_LEN {
		return Err(IdentifierError::TooLong { kind, len: raw.len() });
	}

	match raw.char_indices().find(|(_, c)| c.is_whitespace() || c.is_control()) {
		Some((index, _)) => Err(IdentifierError::IllegalCharacter { kind, index }),
		None => Ok(()),
	}
}

macro_rules! def_id {
	($name:ident, $kind:literal, $doc:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(Arc<str>);
		impl $name {
			/// Validates `raw` and wraps it.
			pub fn new(raw: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let raw = raw.as_ref();

				check($kind, raw)?;

				Ok(Self(Arc::from(raw)))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &str {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(raw: String) -> Result<Self, Self::Error> {
				Self::new(raw)
			}
		}
		impl From<$name> for String {
			fn from(id: $name) -> Self {
				id.0.as_ref().to_owned()
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, "{}({:?})", $kind, &*self.0)
			}
		}
	};
}

def_id! { ClientId, "Client", "Identifier of a registered OAuth client application." }
def_id! { OrgId, "Org", "Identifier of the organization that owns APIs and keys." }
def_id! { ApiId, "Api", "Identifier of a loaded API definition." }
def_id! { PolicyId, "Policy", "Identifier of a policy stamped onto issued keys." }
