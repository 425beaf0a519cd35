//! Key Derivation Module
//!
//! Builds deterministic cache keys from a function's identity and the
//! arguments of a call.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha224};

use crate::config::CacheConfig;
use crate::error::Result;

// == Signature ==
/// A declared parameter, with its default value if it has one.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Value>,
}

/// The identity of a memoized function: its name and declared parameters.
///
/// Positional arguments are bound to parameter names in declaration order,
/// and declared defaults form the base of the key material.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    name: String,
    params: Vec<Param>,
}

impl Signature {
    /// Creates a signature with no declared parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Declares a parameter without a default.
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            default: None,
        });
        self
    }

    /// Declares a parameter with a default value.
    pub fn param_with_default(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.params.push(Param {
            name: name.into(),
            default: Some(default.into()),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    // == Bind ==
    /// Binds a call's arguments to parameter names.
    ///
    /// Defaults first, then keyword arguments, then positional arguments bound
    /// to declared names in order. Positionals beyond the declared parameters
    /// are bound under their index. The receiver is not a parameter and is
    /// left out.
    pub fn bind(&self, args: &Args) -> BTreeMap<String, Value> {
        let mut bound: BTreeMap<String, Value> = BTreeMap::new();

        for param in &self.params {
            if let Some(default) = &param.default {
                bound.insert(param.name.clone(), default.clone());
            }
        }

        for (name, value) in args.keywords() {
            bound.insert(name.clone(), value.clone());
        }

        for (index, value) in args.positionals().iter().enumerate() {
            let name = self
                .params
                .get(index)
                .map(|param| param.name.clone())
                .unwrap_or_else(|| index.to_string());
            bound.insert(name, value.clone());
        }

        bound
    }
}

// == Args ==
/// Arguments of a single call, as JSON values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    receiver: Option<String>,
    positional: Vec<Value>,
    keyword: BTreeMap<String, Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Appends a positional argument of any serializable type.
    pub fn arg_serde<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        self.positional.push(serde_json::to_value(value)?);
        Ok(self)
    }

    /// Sets a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    /// Sets a keyword argument of any serializable type.
    pub fn kwarg_serde<T: Serialize + ?Sized>(
        mut self,
        name: impl Into<String>,
        value: &T,
    ) -> Result<Self> {
        self.keyword.insert(name.into(), serde_json::to_value(value)?);
        Ok(self)
    }

    /// Marks the call as made through a receiver with the given identity.
    ///
    /// The identity becomes part of the key, so two receivers calling the same
    /// method with the same arguments get separate entries.
    pub fn receiver(mut self, identity: impl Into<String>) -> Self {
        self.receiver = Some(identity.into());
        self
    }

    /// Uses the receiver's type and address as its identity, for receivers
    /// that cannot be serialized.
    pub fn receiver_of<T: ?Sized>(self, receiver: &T) -> Self {
        let identity = format!("{}@{:p}", std::any::type_name::<T>(), receiver);
        self.receiver(identity)
    }

    pub fn positional(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keyword.get(name)
    }

    pub fn positionals(&self) -> &[Value] {
        &self.positional
    }

    pub fn keywords(&self) -> &BTreeMap<String, Value> {
        &self.keyword
    }

    pub fn receiver_identity(&self) -> Option<&str> {
        self.receiver.as_deref()
    }

    /// Looks up the value bound to parameter `name`, whether it was passed
    /// positionally, by keyword or left to its default.
    ///
    /// Agrees with [`Signature::bind`], so a call made positionally and the
    /// same call made by keyword read the same values.
    pub fn get<'a>(&'a self, signature: &'a Signature, name: &str) -> Option<&'a Value> {
        let index = signature
            .params()
            .iter()
            .position(|param| param.name == name)
            .or_else(|| {
                name.parse::<usize>()
                    .ok()
                    .filter(|index| *index >= signature.params().len())
            });

        if let Some(value) = index.and_then(|index| self.positional.get(index)) {
            return Some(value);
        }
        if let Some(value) = self.keyword.get(name) {
            return Some(value);
        }
        index
            .and_then(|index| signature.params().get(index))
            .and_then(|param| param.default.as_ref())
    }
}

// == Key Deriver ==
/// Derives cache keys according to the cache's key settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDeriver {
    hashing: bool,
    join: String,
    prefix: String,
}

impl KeyDeriver {
    pub fn new(hashing: bool, join: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            hashing,
            join: join.into(),
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.hashing, config.key_join.clone(), config.prefix.clone())
    }

    // == Derive ==
    /// Derives the key for one call.
    ///
    /// A non-empty explicit key is used literally (prefixed, never hashed).
    /// Otherwise the key is `[prefix|]name|material`, where material is the
    /// canonical argument map or its SHA-224 digest.
    pub fn derive(&self, signature: &Signature, explicit_key: Option<&str>, args: &Args) -> String {
        if let Some(key) = explicit_key.filter(|k| !k.is_empty()) {
            return self.reserved_key(key);
        }

        let material = Self::material(signature, args);
        let formatted = if self.hashing {
            hex::encode(Sha224::digest(material.as_bytes()))
        } else {
            material
        };

        self.with_prefix(&[signature.name(), &formatted])
    }

    /// The stored form of an explicit key, as reserved at registration.
    pub fn reserved_key(&self, key: &str) -> String {
        self.with_prefix(&[key])
    }

    // == Material ==
    /// Canonical string for a call's arguments: the [`Signature::bind`] map
    /// rendered as JSON with sorted keys.
    ///
    /// A call through a receiver renders as `[identity, bound]`. Plain calls
    /// always render as an object, so no choice of parameter names can make
    /// the two forms meet.
    pub fn material(signature: &Signature, args: &Args) -> String {
        let bound: Map<String, Value> = signature.bind(args).into_iter().collect();
        let bound = Value::Object(bound);

        match args.receiver_identity() {
            Some(identity) => {
                Value::Array(vec![Value::String(identity.to_string()), bound]).to_string()
            }
            None => bound.to_string(),
        }
    }

    fn with_prefix(&self, parts: &[&str]) -> String {
        let mut key = String::new();
        if !self.prefix.is_empty() {
            key.push_str(&self.prefix);
            key.push_str(&self.join);
        }
        key.push_str(&parts.join(self.join.as_str()));
        key
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn literal() -> KeyDeriver {
        KeyDeriver::new(false, "|", "")
    }

    #[test]
    fn test_literal_key_format() {
        let sig = Signature::new("square").param("x");
        let key = literal().derive(&sig, None, &Args::new().arg(8));
        assert_eq!(key, r#"square|{"x":8}"#);
    }

    #[test]
    fn test_prefix_is_joined() {
        let deriver = KeyDeriver::new(false, "|", "myapp");
        let sig = Signature::new("square").param("x");
        let key = deriver.derive(&sig, None, &Args::new().arg(2));
        assert_eq!(key, r#"myapp|square|{"x":2}"#);
    }

    #[test]
    fn test_hashed_key_is_sha224_hex() {
        let deriver = KeyDeriver::new(true, "|", "");
        let sig = Signature::new("square").param("x");
        let key = deriver.derive(&sig, None, &Args::new().arg(8));

        let digest = key.strip_prefix("square|").unwrap();
        assert_eq!(digest.len(), 56);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, hex::encode(Sha224::digest(br#"{"x":8}"#)));
    }

    #[test]
    fn test_defaults_keywords_and_positionals_agree() {
        let sig = Signature::new("power")
            .param("base")
            .param_with_default("exp", 2);
        let deriver = literal();

        let by_default = deriver.derive(&sig, None, &Args::new().arg(3));
        let by_keyword = deriver.derive(&sig, None, &Args::new().arg(3).kwarg("exp", 2));
        let by_position = deriver.derive(&sig, None, &Args::new().arg(3).arg(2));
        let all_keyword =
            deriver.derive(&sig, None, &Args::new().kwarg("exp", 2).kwarg("base", 3));

        assert_eq!(by_default, r#"power|{"base":3,"exp":2}"#);
        assert_eq!(by_default, by_keyword);
        assert_eq!(by_default, by_position);
        assert_eq!(by_default, all_keyword);
    }

    #[test]
    fn test_different_arguments_differ() {
        let sig = Signature::new("square").param("x");
        let deriver = KeyDeriver::new(true, "|", "");
        assert_ne!(
            deriver.derive(&sig, None, &Args::new().arg(1)),
            deriver.derive(&sig, None, &Args::new().arg(2))
        );
    }

    #[test]
    fn test_function_name_distinguishes_keys() {
        let deriver = literal();
        let args = Args::new().arg(1);
        assert_ne!(
            deriver.derive(&Signature::new("a").param("x"), None, &args),
            deriver.derive(&Signature::new("b").param("x"), None, &args)
        );
    }

    #[test]
    fn test_extra_positionals_bound_by_index() {
        let sig = Signature::new("f").param("a");
        let key = literal().derive(&sig, None, &Args::new().arg(1).arg("two"));
        assert_eq!(key, r#"f|{"1":"two","a":1}"#);
    }

    #[test]
    fn test_explicit_key_is_literal() {
        let deriver = KeyDeriver::new(true, "|", "");
        let sig = Signature::new("test2");
        assert_eq!(deriver.derive(&sig, Some("test"), &Args::new().arg(5)), "test");

        let prefixed = KeyDeriver::new(true, ":", "app");
        assert_eq!(prefixed.derive(&sig, Some("test"), &Args::new()), "app:test");
        assert_eq!(prefixed.reserved_key("test"), "app:test");
    }

    #[test]
    fn test_empty_explicit_key_is_ignored() {
        let sig = Signature::new("f");
        assert_eq!(literal().derive(&sig, Some(""), &Args::new()), "f|{}");
    }

    #[test]
    fn test_receiver_makes_keys_instance_sensitive() {
        struct App {
            _id: u8,
        }
        let first = App { _id: 1 };
        let second = App { _id: 2 };
        let sig = Signature::new("test1").param("argument").param("power");
        let deriver = literal();

        let a = deriver.derive(&sig, None, &Args::new().receiver_of(&first).arg(3).arg(0));
        let a_again = deriver.derive(&sig, None, &Args::new().receiver_of(&first).arg(3).arg(0));
        let b = deriver.derive(&sig, None, &Args::new().receiver_of(&second).arg(3).arg(0));

        assert_eq!(a, a_again);
        assert_ne!(a, b);
    }

    #[test]
    fn test_serde_arguments() {
        #[derive(Serialize)]
        struct Point {
            y: i32,
            x: i32,
        }

        let sig = Signature::new("dist").param("p");
        let args = Args::new().arg_serde(&Point { y: 2, x: 1 }).unwrap();
        assert_eq!(
            literal().derive(&sig, None, &args),
            r#"dist|{"p":{"x":1,"y":2}}"#
        );
    }

    #[test]
    fn test_receiver_does_not_clash_with_self_parameter() {
        let sig = Signature::new("m").param("self");
        let deriver = literal();

        let by_param = deriver.derive(&sig, None, &Args::new().kwarg("self", "a"));
        let by_receiver = deriver.derive(&Signature::new("m"), None, &Args::new().receiver("a"));

        assert_eq!(by_param, r#"m|{"self":"a"}"#);
        assert_eq!(by_receiver, r#"m|["a",{}]"#);
        assert_ne!(by_param, by_receiver);

        // A receiver never overwrites an argument of the same name
        let both = deriver.derive(&sig, None, &Args::new().receiver("r").kwarg("self", "a"));
        assert_eq!(both, r#"m|["r",{"self":"a"}]"#);
    }

    #[test]
    fn test_bind_matches_material() {
        let sig = Signature::new("power")
            .param("base")
            .param_with_default("exp", 2);
        let bound = sig.bind(&Args::new().kwarg("base", 3));

        assert_eq!(bound.get("base"), Some(&Value::from(3)));
        assert_eq!(bound.get("exp"), Some(&Value::from(2)));
        assert_eq!(
            KeyDeriver::material(&sig, &Args::new().kwarg("base", 3)),
            r#"{"base":3,"exp":2}"#
        );
    }

    #[test]
    fn test_get_reads_any_binding() {
        let sig = Signature::new("power")
            .param("base")
            .param_with_default("exp", 2);

        let positional = Args::new().arg(3).arg(4);
        let keyword = Args::new().kwarg("exp", 4).kwarg("base", 3);
        let defaulted = Args::new().arg(3);

        for args in [&positional, &keyword] {
            assert_eq!(args.get(&sig, "base"), Some(&Value::from(3)));
            assert_eq!(args.get(&sig, "exp"), Some(&Value::from(4)));
        }
        assert_eq!(defaulted.get(&sig, "exp"), Some(&Value::from(2)));
        assert_eq!(defaulted.get(&sig, "missing"), None);

        let extra = Args::new().arg(1).arg(2).arg(3);
        assert_eq!(extra.get(&sig, "2"), Some(&Value::from(3)));
    }
}
