//! DNS-SD TXT record attributes.

use std::collections::{BTreeMap, BTreeSet};

use crate::{Error, Result};

/// The set of attributes conveyed in a single TXT record of a DNS-SD
/// service instance.
///
/// Each attribute is either a key/value pair, where the value is a byte
/// string, or a flag (called a boolean attribute in RFC 6763). Pairs and
/// flags occupy the same keyspace: a flag is encoded on the wire as a bare
/// `key`, which is distinct from a pair with an empty value (`key=`), so a
/// key carries exactly one of the two.
///
/// Keys are case-insensitive and are stored lowercase. They MUST be at
/// least one character long and SHOULD NOT be longer than 9 characters
/// (advisory, not enforced here). Key characters MUST be printable
/// US-ASCII (0x20-0x7E), excluding '=' (0x3D).
///
/// All mutating operations return a new set; the receiver is never
/// observed to change.
///
/// See RFC 6763 section 6.1.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Attributes {
    // A value of None marks a flag; Some(bytes), including the empty
    // vector, is a regular key/value pair.
    m: BTreeMap<String, Option<Vec<u8>>>,
}

impl Attributes {
    /// Returns a new empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value associated with the key `k`.
    ///
    /// Returns `None` unless `k` exists and is a key/value pair; a flag
    /// with this key does not count.
    ///
    /// Panics if `k` is not a valid attribute key.
    pub fn get(&self, k: &str) -> Option<&[u8]> {
        self.m
            .get(&must_normalize_key(k.as_bytes()))
            .and_then(|v| v.as_deref())
    }

    /// Returns a clone of the attributes with an additional key/value
    /// pair, replacing any existing pair or flag with this key.
    ///
    /// Panics if `k` is not a valid attribute key.
    pub fn with_pair(&self, k: &str, v: impl Into<Vec<u8>>) -> Self {
        let mut m = self.m.clone();
        m.insert(must_normalize_key(k.as_bytes()), Some(v.into()));
        Self { m }
    }

    /// Returns a clone of the attributes with an additional flag,
    /// replacing any existing pair or flag with this key.
    ///
    /// Use [`Attributes::without`] to clear a flag.
    ///
    /// Panics if `k` is not a valid attribute key.
    pub fn with_flag(&self, k: &str) -> Self {
        let mut m = self.m.clone();
        m.insert(must_normalize_key(k.as_bytes()), None);
        Self { m }
    }

    /// Returns a clone of the attributes without the given keys,
    /// regardless of whether they are key/value pairs or flags.
    pub fn without<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Self {
        let mut m = self.m.clone();
        for k in keys {
            m.remove(&must_normalize_key(k.as_bytes()));
        }
        Self { m }
    }

    /// Returns true if all of the given flags are present. With no keys,
    /// returns true.
    pub fn has_flags<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> bool {
        keys.into_iter().all(|k| {
            matches!(self.m.get(&must_normalize_key(k.as_bytes())), Some(None))
        })
    }

    /// Returns the key/value pair (i.e. non-flag) attributes.
    pub fn pairs(&self) -> BTreeMap<String, Vec<u8>> {
        self.m
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), v.clone())))
            .collect()
    }

    /// Returns the flag (i.e. non-pair) attributes that are set.
    pub fn flags(&self) -> BTreeSet<String> {
        self.m
            .iter()
            .filter_map(|(k, v)| v.is_none().then(|| k.clone()))
            .collect()
    }

    /// Returns true if there are no attributes present.
    pub fn is_empty(&self) -> bool {
        self.m.is_empty()
    }

    /// Returns a clone of the attributes with one attribute parsed from a
    /// single string within a TXT record.
    ///
    /// The boolean result is false when the string was ignored: per RFC
    /// 6763 section 6.4, empty strings and strings beginning with '='
    /// (i.e. a missing key) MUST be silently ignored.
    pub fn with_txt(&self, s: &[u8]) -> Result<(Self, bool)> {
        if s.is_empty() {
            return Ok((self.clone(), false));
        }

        let (k, v) = match s.iter().position(|&ch| ch == b'=') {
            Some(0) => return Ok((self.clone(), false)),
            Some(n) => (&s[..n], Some(s[n + 1..].to_vec())),
            None => (s, None),
        };

        let mut m = self.m.clone();
        m.insert(normalize_key(k)?, v);
        Ok((Self { m }, true))
    }

    /// Returns the representation of each attribute as it appears within
    /// the TXT record: `key` for flags, `key=value` for pairs.
    ///
    /// The result is deterministic (keys are emitted in ascending order,
    /// except that a "txtvers" attribute is always first, per RFC 6763
    /// section 6.7) to avoid unnecessary DNS churn when the attributes are
    /// used to construct records.
    pub fn to_txt(&self) -> Vec<Vec<u8>> {
        const VERSION_KEY: &str = "txtvers";

        let mut result = Vec::with_capacity(self.m.len());

        let emit = |result: &mut Vec<Vec<u8>>, k: &str, v: &Option<Vec<u8>>| {
            let mut s = k.as_bytes().to_vec();
            if let Some(v) = v {
                s.push(b'=');
                s.extend_from_slice(v);
            }
            result.push(s);
        };

        if let Some(v) = self.m.get(VERSION_KEY) {
            emit(&mut result, VERSION_KEY, v);
        }

        for (k, v) in &self.m {
            if k != VERSION_KEY {
                emit(&mut result, k, v);
            }
        }

        result
    }

    pub(crate) fn lookup(&self, normalized: &str) -> Option<&Option<Vec<u8>>> {
        self.m.get(normalized)
    }
}

/// An ordered sequence of [`Attributes`]. Each entry holds the attributes
/// conveyed in a separate TXT record of the same service instance.
#[derive(Clone, Debug, Default)]
pub struct AttributeCollection {
    sets: Vec<Attributes>,
}

impl AttributeCollection {
    /// Returns a new empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an attribute set to the collection.
    pub fn push(&mut self, attrs: Attributes) {
        self.sets.push(attrs);
    }

    /// Returns an iterator over the attribute sets.
    pub fn iter(&self) -> std::slice::Iter<'_, Attributes> {
        self.sets.iter()
    }

    /// Returns the number of attribute sets (i.e. TXT records).
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Returns true if the collection contains no attribute sets.
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Returns the last value associated with the key `k` across the
    /// collection ("rightmost wins").
    ///
    /// Returns `None` unless some set carries `k` as a key/value pair; a
    /// flag does not mask a pair in an earlier set.
    ///
    /// Panics if `k` is not a valid attribute key.
    pub fn get(&self, k: &str) -> Option<&[u8]> {
        let k = must_normalize_key(k.as_bytes());

        self.sets
            .iter()
            .rev()
            .find_map(|a| a.lookup(&k).and_then(|v| v.as_deref()))
    }

    /// Returns true if all of the given flags are present somewhere in the
    /// collection. With no keys, returns true.
    pub fn has_flags<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> bool {
        keys.into_iter().all(|k| {
            let k = must_normalize_key(k.as_bytes());
            self.sets
                .iter()
                .any(|a| matches!(a.lookup(&k), Some(None)))
        })
    }

    /// Returns the key/value pair attributes of every set, with later sets
    /// overriding earlier ones.
    pub fn pairs(&self) -> BTreeMap<String, Vec<u8>> {
        let mut pairs = BTreeMap::new();
        for a in &self.sets {
            pairs.extend(a.pairs());
        }
        pairs
    }

    /// Returns the union of the flag attributes of every set.
    pub fn flags(&self) -> BTreeSet<String> {
        let mut flags = BTreeSet::new();
        for a in &self.sets {
            flags.extend(a.flags());
        }
        flags
    }
}

/// Two collections are equal if they contain the same attribute sets in
/// any order, i.e. they are compared as multisets.
impl PartialEq for AttributeCollection {
    fn eq(&self, other: &Self) -> bool {
        if self.sets.len() != other.sets.len() {
            return false;
        }

        let mut visited = vec![false; other.sets.len()];

        'left: for l in &self.sets {
            for (i, r) in other.sets.iter().enumerate() {
                if !visited[i] && l == r {
                    visited[i] = true;
                    continue 'left;
                }
            }
            return false;
        }

        true
    }
}

impl Eq for AttributeCollection {}

impl From<Vec<Attributes>> for AttributeCollection {
    fn from(sets: Vec<Attributes>) -> Self {
        Self { sets }
    }
}

impl FromIterator<Attributes> for AttributeCollection {
    fn from_iter<I: IntoIterator<Item = Attributes>>(iter: I) -> Self {
        Self {
            sets: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a AttributeCollection {
    type Item = &'a Attributes;
    type IntoIter = std::slice::Iter<'a, Attributes>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Normalizes a TXT attribute key, or panics if it can not be normalized.
fn must_normalize_key(k: &[u8]) -> String {
    normalize_key(k).unwrap_or_else(|err| panic!("{}", err))
}

/// Normalizes a TXT attribute key: validates the character set and lowers
/// the case of ASCII letters.
///
/// See RFC 6763 section 6.4.
fn normalize_key(k: &[u8]) -> Result<String> {
    if k.is_empty() {
        return Err(Error::InvalidKey("key must not be empty".to_string()));
    }

    let mut w = String::with_capacity(k.len());

    for &ch in k {
        if ch == b'=' {
            return Err(Error::InvalidKey(format!(
                "invalid key '{}', key must not contain '=' character",
                String::from_utf8_lossy(k)
            )));
        }

        if !(0x20..=0x7E).contains(&ch) {
            return Err(Error::InvalidKey(format!(
                "invalid key '{}', key must contain only printable ASCII characters",
                String::from_utf8_lossy(k)
            )));
        }

        w.push(ch.to_ascii_lowercase() as char);
    }

    Ok(w)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_normalized_to_lowercase() {
        let a = Attributes::new().with_pair("TxtVers", "1");
        assert_eq!(a.get("txtvers"), Some(&b"1"[..]));
        assert_eq!(a.get("TXTVERS"), Some(&b"1"[..]));
        assert_eq!(a.to_txt(), vec![b"txtvers=1".to_vec()]);
    }

    #[test]
    #[should_panic(expected = "key must not be empty")]
    fn empty_keys_are_rejected() {
        Attributes::new().with_pair("", "v");
    }

    #[test]
    #[should_panic(expected = "printable ASCII")]
    fn non_ascii_keys_are_rejected() {
        Attributes::new().with_flag("kéy");
    }

    #[test]
    fn pairs_and_flags_share_one_keyspace() {
        let a = Attributes::new().with_pair("k", "v").with_flag("k");
        assert_eq!(a.get("k"), None);
        assert!(a.has_flags(["k"]));

        let a = Attributes::new().with_flag("k").with_pair("k", "v");
        assert!(!a.has_flags(["k"]));
        assert_eq!(a.get("k"), Some(&b"v"[..]));
    }

    #[test]
    fn empty_pair_values_are_not_flags() {
        let a = Attributes::new().with_pair("k", "");
        assert_eq!(a.get("k"), Some(&b""[..]));
        assert!(!a.has_flags(["k"]));
        assert_eq!(a.to_txt(), vec![b"k=".to_vec()]);
    }

    #[test]
    fn has_flags_is_vacuously_true() {
        assert!(Attributes::new().has_flags([]));
    }

    #[test]
    fn without_removes_pairs_and_flags_alike() {
        let a = Attributes::new()
            .with_pair("p", "v")
            .with_flag("f")
            .without(["p", "f", "missing"]);
        assert!(a.is_empty());
    }

    #[test]
    fn mutations_do_not_affect_the_original() {
        let a = Attributes::new().with_pair("k", "v");
        let b = a.with_flag("other");
        assert_eq!(a.get("k"), Some(&b"v"[..]));
        assert!(!a.has_flags(["other"]));
        assert!(b.has_flags(["other"]));
    }

    #[test]
    fn with_txt_parses_pairs_and_flags() {
        let a = Attributes::new();

        let (a, ok) = a.with_txt(b"key=value").unwrap();
        assert!(ok);
        assert_eq!(a.get("key"), Some(&b"value"[..]));

        let (a, ok) = a.with_txt(b"flag").unwrap();
        assert!(ok);
        assert!(a.has_flags(["flag"]));

        // Everything after the first '=' belongs to the value.
        let (a, ok) = a.with_txt(b"eq=a=b").unwrap();
        assert!(ok);
        assert_eq!(a.get("eq"), Some(&b"a=b"[..]));
    }

    #[test]
    fn with_txt_ignores_empty_and_keyless_strings() {
        let a = Attributes::new();

        let (a, ok) = a.with_txt(b"").unwrap();
        assert!(!ok);

        let (a, ok) = a.with_txt(b"=value").unwrap();
        assert!(!ok);
        assert!(a.is_empty());
    }

    #[test]
    fn with_txt_reports_invalid_keys() {
        let err = Attributes::new().with_txt(b"\x01=v").unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
    }

    #[test]
    fn to_txt_is_deterministic_and_pins_txtvers_first() {
        let a = Attributes::new()
            .with_pair("zeta", "z")
            .with_flag("alpha")
            .with_pair("txtvers", "1");

        let expect = vec![
            b"txtvers=1".to_vec(),
            b"alpha".to_vec(),
            b"zeta=z".to_vec(),
        ];
        assert_eq!(a.to_txt(), expect);
        assert_eq!(a.to_txt(), expect);
    }

    #[test]
    fn to_txt_round_trips_through_with_txt() {
        let a = Attributes::new()
            .with_pair("txtvers", "1")
            .with_pair("path", "/printer")
            .with_pair("empty", "")
            .with_flag("color");

        let mut b = Attributes::new();
        for s in a.to_txt() {
            let (next, ok) = b.with_txt(&s).unwrap();
            assert!(ok);
            b = next;
        }

        assert_eq!(a, b);
    }

    #[test]
    fn collection_get_is_rightmost_wins() {
        let c = AttributeCollection::from(vec![
            Attributes::new().with_pair("k", "first").with_pair("only", "x"),
            Attributes::new().with_pair("k", "second"),
            // A flag does not mask an earlier pair.
            Attributes::new().with_flag("only"),
        ]);

        assert_eq!(c.get("k"), Some(&b"second"[..]));
        assert_eq!(c.get("only"), Some(&b"x"[..]));
        assert_eq!(c.get("missing"), None);
    }

    #[test]
    fn collection_has_flags_scans_all_sets() {
        let c = AttributeCollection::from(vec![
            Attributes::new().with_flag("a"),
            Attributes::new().with_flag("b"),
        ]);

        assert!(c.has_flags(["a", "b"]));
        assert!(!c.has_flags(["a", "c"]));
        assert!(c.has_flags([]));
    }

    #[test]
    fn collections_compare_as_multisets() {
        let x = Attributes::new().with_pair("k", "x");
        let y = Attributes::new().with_flag("y");

        let a = AttributeCollection::from(vec![x.clone(), y.clone()]);
        let b = AttributeCollection::from(vec![y.clone(), x.clone()]);
        assert_eq!(a, b);

        let c = AttributeCollection::from(vec![x.clone(), x.clone()]);
        let d = AttributeCollection::from(vec![x, y]);
        assert_ne!(c, d);
    }
}
