//! Immutable API registry built once per configuration load, swapped atomically on reload.

// self
use crate::{
	_prelude::*,
	auth::ApiId,
	config::ApiSpec,
	error::ConfigError,
};

/// Snapshot of every loaded API, indexed by id and by listen path.
#[derive(Debug, Default)]
pub struct ApiRegistry {
	by_id: HashMap<ApiId, Arc<ApiSpec>>,
	// Longest listen path first so prefix matching picks the most specific API.
	by_listen_path: Vec<Arc<ApiSpec>>,
}
impl ApiRegistry {
	/// Validates and indexes `specs`; duplicate ids or listen paths are rejected.
	pub fn build<I>(specs: I) -> Result<Self, ConfigError>
	where
		I: IntoIterator<Item = ApiSpec>,
	{
		let mut by_id = HashMap::new();
		let mut by_listen_path = Vec::<Arc<ApiSpec>>::new();

		for spec in specs {
			spec.validate()?;

			if by_id.contains_key(&spec.api_id) {
				return Err(ConfigError::DuplicateApi { api_id: spec.api_id.to_string() });
			}
			if by_listen_path.iter().any(|other| other.listen_path() == spec.listen_path()) {
				return Err(ConfigError::DuplicateListenPath {
					listen_path: spec.listen_path().to_owned(),
				});
			}

			let spec = Arc::new(spec);

			by_id.insert(spec.api_id.clone(), spec.clone());
			by_listen_path.push(spec);
		}

		by_listen_path.sort_by(|a, b| b.listen_path().len().cmp(&a.listen_path().len()));

		Ok(Self { by_id, by_listen_path })
	}

	/// Looks up an API by identifier.
	pub fn get(&self, api_id: &str) -> Option<Arc<ApiSpec>> {
		self.by_id.get(api_id).cloned()
	}

	/// Resolves the API serving `path`, returning it with the remainder after the listen path.
	///
	/// A path equal to a listen path without its trailing slash still resolves, with an empty
	/// remainder.
	pub fn resolve<'p>(&self, path: &'p str) -> Option<(Arc<ApiSpec>, &'p str)> {
		self.by_listen_path.iter().find_map(|spec| {
			let listen_path = spec.listen_path();

			if let Some(rest) = path.strip_prefix(listen_path) {
				Some((spec.clone(), rest))
			} else if path == listen_path.trim_end_matches('/') {
				Some((spec.clone(), ""))
			} else {
				None
			}
		})
	}

	/// Number of loaded APIs.
	pub fn len(&self) -> usize {
		self.by_id.len()
	}

	/// Returns `true` when no API is loaded.
	pub fn is_empty(&self) -> bool {
		self.by_id.is_empty()
	}
}

/// Shared handle readers snapshot per request and reloads replace wholesale.
#[derive(Clone, Debug, Default)]
pub struct RegistryHandle(Arc<RwLock<Arc<ApiRegistry>>>);
impl RegistryHandle {
	/// Wraps an initial registry.
	pub fn new(registry: ApiRegistry) -> Self {
		Self(Arc::new(RwLock::new(Arc::new(registry))))
	}

	/// Returns the registry current at call time; later swaps do not affect it.
	pub fn snapshot(&self) -> Arc<ApiRegistry> {
		self.0.read().clone()
	}

	/// Installs `registry`, returning the one it replaced.
	pub fn swap(&self, registry: ApiRegistry) -> Arc<ApiRegistry> {
		std::mem::replace(&mut *self.0.write(), Arc::new(registry))
	}
}
