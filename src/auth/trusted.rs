//! Shared-secret verification for trusted management calls.

// crates.io
use subtle::ConstantTimeEq;
// self
use crate::_prelude::*;

/// Proof that the caller presented the management secret.
///
/// Only [`verify_trusted_credential`] constructs it; management-only grant operations take it
/// by reference.
#[derive(Debug)]
pub struct TrustedCaller(());

/// Checks the credential presented on a management call against the configured secret.
///
/// A missing credential fails [`Error::Unauthorized`]; a wrong one, or a gateway with no
/// secret configured, fails [`Error::Forbidden`].
pub fn verify_trusted_credential(
	presented: Option<&str>,
	configured: &str,
) -> Result<TrustedCaller> {
	let presented = presented
		.map(str::trim)
		.filter(|value| !value.is_empty())
		.ok_or_else(|| Error::unauthorized("Authorization field missing"))?;

	if configured.is_empty() {
		return Err(Error::forbidden("Management access is disabled"));
	}
	if bool::from(presented.as_bytes().ct_eq(configured.as_bytes())) {
		Ok(TrustedCaller(()))
	} else {
		Err(Error::forbidden("Attempted administrative access with invalid or missing key"))
	}
}

#[cfg(any(test, feature = "test"))]
impl TrustedCaller {
	/// Fixture constructor for tests that bypass the credential check.
	pub fn for_tests() -> Self {
		Self(())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn credential_checks_distinguish_missing_from_wrong() {
		assert!(verify_trusted_credential(Some("s3cret"), "s3cret").is_ok());
		assert!(matches!(
			verify_trusted_credential(None, "s3cret"),
			Err(Error::Unauthorized { .. })
		));
		assert!(matches!(
			verify_trusted_credential(Some("  "), "s3cret"),
			Err(Error::Unauthorized { .. })
		));
		assert!(matches!(
			verify_trusted_credential(Some("nope"), "s3cret"),
			Err(Error::Forbidden { .. })
		));
		assert!(matches!(verify_trusted_credential(Some("x"), ""), Err(Error::Forbidden { .. })));
	}
}
