//! Policies bound to keys by identifier, and the source they are resolved from.

// self
use crate::{
	_prelude::*,
	auth::{AccessDefinition, ApiId, PolicyId},
};

/// Boxed future returned by [`PolicySource`] lookups.
pub type PolicyFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<Policy>>> + 'a + Send>>;

/// Access rules shared by every key bound to the policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
	/// Policy identifier, as stamped on key records.
	pub id: PolicyId,
	/// APIs reachable under the policy; empty allows every API.
	#[serde(default)]
	pub access_rights: BTreeMap<ApiId, AccessDefinition>,
}
impl Policy {
	/// Creates a policy with no access restrictions.
	pub fn new(id: PolicyId) -> Self {
		Self { id, access_rights: BTreeMap::new() }
	}

	/// Grants access to `api_id`, optionally narrowed to `versions`.
	pub fn allow_api<I, S>(mut self, api_id: ApiId, versions: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.access_rights.insert(api_id.clone(), AccessDefinition {
			api_name: String::new(),
			api_id,
			versions: versions.into_iter().map(Into::into).collect(),
		});

		self
	}
}

/// Resolves policy identifiers stamped on key records.
pub trait PolicySource
where
	Self: Send + Sync,
{
	/// Fetches a policy; `None` when the identifier is unknown.
	fn policy<'a>(&'a self, id: &'a PolicyId) -> PolicyFuture<'a>;
}

/// In-memory policy table, replaceable at runtime.
#[derive(Debug, Default)]
pub struct StaticPolicies(RwLock<HashMap<PolicyId, Policy>>);
impl StaticPolicies {
	/// Builds a table from `policies`.
	pub fn from_policies<I>(policies: I) -> Self
	where
		I: IntoIterator<Item = Policy>,
	{
		Self(RwLock::new(policies.into_iter().map(|policy| (policy.id.clone(), policy)).collect()))
	}

	/// Inserts or replaces a policy.
	pub fn insert(&self, policy: Policy) -> Option<Policy> {
		self.0.write().insert(policy.id.clone(), policy)
	}

	/// Removes a policy.
	pub fn remove(&self, id: &PolicyId) -> Option<Policy> {
		self.0.write().remove(id)
	}
}
impl PolicySource for StaticPolicies {
	fn policy<'a>(&'a self, id: &'a PolicyId) -> PolicyFuture<'a> {
		let policy = self.0.read().get(id).cloned();

		Box::pin(async move { Ok(policy) })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn static_policies_resolve_by_id() {
		let gold: PolicyId = "gold".parse().expect("Policy fixture should be valid.");
		let api: ApiId = "999999".parse().expect("API fixture should be valid.");
		let policies = StaticPolicies::from_policies([Policy::new(gold.clone()).allow_api(api, ["v1"])]);
		let resolved = policies
			.policy(&gold)
			.await
			.expect("Lookup should succeed.")
			.expect("Gold policy should exist.");

		assert!(resolved.access_rights["999999"].allows_version("v1"));
		assert!(!resolved.access_rights["999999"].allows_version("v2"));
		assert!(policies.remove(&gold).is_some());
		assert!(policies.policy(&gold).await.expect("Lookup should succeed.").is_none());
	}
}
