//! Cache Keys
//!
//! A key identifies one logical remote resource: an endpoint path plus a
//! canonicalized parameter set. Parameters are held in a sorted map so that
//! insertion order never influences equality or hashing.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Immutable identifier for one cached remote resource.
///
/// Cloning is cheap; the endpoint and parameters are shared.
///
/// # Example
///
/// ```rust
/// use dashboard_sync::domain::cache::CacheKey;
///
/// let a = CacheKey::builder("/balance/nccs").param("ovrs_excg_cd", "NASD").build();
/// let b = CacheKey::builder("/balance/nccs").param("ovrs_excg_cd", "NASD").build();
/// let c = CacheKey::builder("/balance/nccs").param("ovrs_excg_cd", "NYSE").build();
///
/// assert_eq!(a, b);
/// assert_ne!(a, c);
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    inner: Arc<KeyParts>,
}

#[derive(PartialEq, Eq, Hash, PartialOrd, Ord)]
struct KeyParts {
    endpoint: String,
    params: BTreeMap<String, String>,
}

impl CacheKey {
    /// Create a key for an endpoint without parameters.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::builder(endpoint).build()
    }

    /// Create a key from an endpoint and a parameter list.
    ///
    /// When a parameter name repeats, the last value wins.
    #[must_use]
    pub fn with_params<I, K, V>(endpoint: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        params
            .into_iter()
            .fold(Self::builder(endpoint), |builder, (name, value)| {
                builder.param(name, value)
            })
            .build()
    }

    /// Start building a key for an endpoint.
    #[must_use]
    pub fn builder(endpoint: impl Into<String>) -> CacheKeyBuilder {
        CacheKeyBuilder {
            endpoint: endpoint.into(),
            params: BTreeMap::new(),
        }
    }

    /// The endpoint path.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// The canonical (sorted) parameter set.
    #[must_use]
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.inner.params
    }

    /// Look up a single parameter value.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.inner.params.get(name).map(String::as_str)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.endpoint)?;
        for (index, (name, value)) in self.inner.params.iter().enumerate() {
            let separator = if index == 0 { '?' } else { '&' };
            write!(f, "{separator}{name}={value}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({self})")
    }
}

/// Builder for [`CacheKey`].
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    endpoint: String,
    params: BTreeMap<String, String>,
}

impl CacheKeyBuilder {
    /// Add a parameter, replacing any previous value for the same name.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Freeze the key.
    #[must_use]
    pub fn build(self) -> CacheKey {
        CacheKey {
            inner: Arc::new(KeyParts {
                endpoint: self.endpoint,
                params: self.params,
            }),
        }
    }
}
