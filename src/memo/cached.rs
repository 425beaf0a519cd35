//! Memoized function wrappers
//!
//! [`Memoized`] serves calls from the cache; [`ClearCache`] wipes the cache
//! before every call.

use std::convert::Infallible;
use std::fmt;
use std::time::Duration;

use crate::cache::{Args, Signature};
use crate::memo::Cache;

// == Cached Options ==
/// Registration options for [`Cache::cached`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedOptions {
    /// Fixed key for every call, used literally and reserved at registration
    pub key: Option<String>,
    /// Per-registration timeout; zero means never expires
    pub timeout: Option<Duration>,
}

impl CachedOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

// == Memoized ==
/// A function whose results are memoized in a [`Cache`].
pub struct Memoized<V, F> {
    cache: Cache<V>,
    signature: Signature,
    key: Option<String>,
    timeout: Option<u64>,
    func: F,
}

impl<V, F> fmt::Debug for Memoized<V, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("signature", &self.signature)
            .field("key", &self.key)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<V, F> Memoized<V, F> {
    pub(crate) fn new(
        cache: Cache<V>,
        signature: Signature,
        key: Option<String>,
        timeout: Option<u64>,
        func: F,
    ) -> Self {
        Self {
            cache,
            signature,
            key,
            timeout,
            func,
        }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The explicit key given at registration, if any.
    pub fn explicit_key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Registration timeout in seconds, if one was given.
    pub fn timeout(&self) -> Option<u64> {
        self.timeout
    }

    pub fn cache(&self) -> &Cache<V> {
        &self.cache
    }
}

impl<V, F> Memoized<V, F>
where
    V: Clone + Send + 'static,
{
    /// The cache key a call with `args` uses.
    pub fn key_for(&self, args: &Args) -> String {
        self.cache
            .key_deriver()
            .derive(&self.signature, self.key.as_deref(), args)
    }

    // == Call ==
    /// Calls the function through the cache.
    pub fn call(&self, args: &Args) -> V
    where
        F: Fn(&Args) -> V,
    {
        match self.invoke(args, |args: &Args| Ok::<V, Infallible>((self.func)(args))) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Calls a fallible function through the cache.
    ///
    /// Errors are returned exactly as the function produced them and are
    /// never cached.
    pub fn try_call<E>(&self, args: &Args) -> Result<V, E>
    where
        F: Fn(&Args) -> Result<V, E>,
    {
        self.invoke(args, &self.func)
    }

    fn invoke<E, G>(&self, args: &Args, func: G) -> Result<V, E>
    where
        G: Fn(&Args) -> Result<V, E>,
    {
        if !self.cache.caching_enabled() {
            return func(args);
        }

        let key = self.key_for(args);
        self.cache.serve(&key, self.timeout, || func(args))
    }
}

// == Clear Cache ==
/// A function that clears its whole cache before each call.
///
/// Suited to refresh or discovery entry points whose side effects make every
/// cached result stale.
pub struct ClearCache<V, F> {
    cache: Cache<V>,
    func: F,
}

impl<V, F> fmt::Debug for ClearCache<V, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClearCache").finish_non_exhaustive()
    }
}

impl<V, F> ClearCache<V, F> {
    pub(crate) fn new(cache: Cache<V>, func: F) -> Self {
        Self { cache, func }
    }
}

impl<V, F> ClearCache<V, F>
where
    V: Clone + Send + 'static,
{
    /// Clears the cache, then calls the function.
    pub fn call<R>(&self, args: &Args) -> R
    where
        F: Fn(&Args) -> R,
    {
        self.cache.clear();
        (self.func)(args)
    }
}
