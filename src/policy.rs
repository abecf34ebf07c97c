//! Caller-configurable limits and strategies applied during encoding and
//! decoding.
//!
//! `Policy` is a closed set of knobs (`spec.md` §4.8): everything a caller
//! can tune lives here, nothing else is configurable. Both [`Encoder`] and
//! [`PositionMap`] take a `Policy` by value.
//!
//! [`Encoder`]: crate::encoder::Encoder
//! [`PositionMap`]: crate::position_map::PositionMap

/// What to do when a string contains invalid UTF-8 bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidUtf8Policy {
    /// Reject the document outright.
    Reject,
    /// Replace each invalid byte sequence with U+FFFD.
    Replace,
    /// Drop the invalid bytes.
    Delete,
}

/// What to do when a string contains an embedded NUL byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NulInStringPolicy {
    /// Reject the document outright.
    Reject,
    /// Allow it through unchanged.
    Allow,
}

/// What to do when an object contains the same key more than once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DuplicateKeyPolicy {
    /// Reject the document outright.
    Reject,
    /// Keep the first occurrence, ignore later ones.
    KeepFirst,
    /// Keep the last occurrence, overwriting earlier ones.
    KeepLast,
}

/// What to do when a `NaN` or infinite float is encountered.
#[derive(Clone, Debug, PartialEq)]
pub enum NanInfinityPolicy {
    /// Reject the document outright.
    Reject,
    /// Allow it through unchanged as an IEEE-754 bit pattern.
    Allow,
    /// Substitute one of three caller-supplied strings in place of the
    /// numeric value.
    Stringify {
        nan: String,
        pos_infinity: String,
        neg_infinity: String,
    },
}

/// What to do with bytes left over after the single root value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrailingBytesPolicy {
    /// Reject the document outright.
    Reject,
    /// Ignore any trailing bytes.
    Allow,
}

/// Whether string keys and values are normalized to Unicode NFC before
/// encoding / after decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnicodeNormalizationPolicy {
    /// Pass strings through unchanged.
    None,
    /// Normalize to NFC.
    Nfc,
}

/// What to do when a BigNumber's magnitude would not fit the configured
/// caps ([`Policy::max_bignumber_exponent`], [`Policy::max_bignumber_magnitude_bytes`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BignumberOutOfRangePolicy {
    /// Reject the document outright.
    Reject,
    /// Fall back to encoding the value as a decimal string.
    Stringify,
}

/// The closed set of caller-configurable limits and strategies used by both
/// the encoder and the decoder (position-map builder).
///
/// Construct with [`Policy::new`] (same as [`Policy::default`]) and chain
/// the builder methods to override individual fields. Field defaults match
/// `spec.md` §4.8.
#[derive(Clone, Debug, PartialEq)]
pub struct Policy {
    max_depth: usize,
    max_container_size: usize,
    max_string_length: usize,
    max_document_size: usize,
    max_bignumber_exponent: Option<u64>,
    max_bignumber_magnitude_bytes: Option<usize>,
    nul_in_string: NulInStringPolicy,
    invalid_utf8: InvalidUtf8Policy,
    duplicate_key: DuplicateKeyPolicy,
    trailing_bytes: TrailingBytesPolicy,
    nan_infinity: NanInfinityPolicy,
    unicode_normalization: UnicodeNormalizationPolicy,
    bignumber_out_of_range: BignumberOutOfRangePolicy,
}

impl Default for Policy {
    fn default() -> Self {
        Policy {
            max_depth: 512,
            max_container_size: 1_000_000,
            max_string_length: 10_000_000,
            max_document_size: 2_000_000_000,
            max_bignumber_exponent: None,
            max_bignumber_magnitude_bytes: None,
            nul_in_string: NulInStringPolicy::Reject,
            invalid_utf8: InvalidUtf8Policy::Reject,
            duplicate_key: DuplicateKeyPolicy::Reject,
            trailing_bytes: TrailingBytesPolicy::Reject,
            nan_infinity: NanInfinityPolicy::Reject,
            unicode_normalization: UnicodeNormalizationPolicy::None,
            bignumber_out_of_range: BignumberOutOfRangePolicy::Reject,
        }
    }
}

impl Policy {
    /// A policy with every field at its default, permissive-but-bounded
    /// value.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum container nesting depth. Default `512`.
    pub fn max_depth(mut self, v: usize) -> Self {
        self.max_depth = v;
        self
    }

    /// Maximum number of elements in any one array, or key+value pairs ×2
    /// in any one object. Default `1_000_000`.
    pub fn max_container_size(mut self, v: usize) -> Self {
        self.max_container_size = v;
        self
    }

    /// Maximum decoded byte length of any one string. Default
    /// `10_000_000`.
    pub fn max_string_length(mut self, v: usize) -> Self {
        self.max_string_length = v;
        self
    }

    /// Maximum total size, in bytes, of an encoded document. Default
    /// `2_000_000_000`.
    pub fn max_document_size(mut self, v: usize) -> Self {
        self.max_document_size = v;
        self
    }

    /// Maximum absolute exponent magnitude accepted for a BigNumber before
    /// [`Policy::bignumber_out_of_range`] applies. `None` (the default)
    /// means unlimited.
    pub fn max_bignumber_exponent(mut self, v: u64) -> Self {
        self.max_bignumber_exponent = Some(v);
        self
    }

    /// Maximum magnitude byte-length accepted for a BigNumber before
    /// [`Policy::bignumber_out_of_range`] applies. `None` (the default)
    /// means unlimited.
    pub fn max_bignumber_magnitude_bytes(mut self, v: usize) -> Self {
        self.max_bignumber_magnitude_bytes = Some(v);
        self
    }

    /// NUL-byte-in-string strategy. Default [`NulInStringPolicy::Reject`].
    pub fn nul_in_string(mut self, v: NulInStringPolicy) -> Self {
        self.nul_in_string = v;
        self
    }

    /// Invalid-UTF-8 strategy. Default [`InvalidUtf8Policy::Reject`].
    pub fn invalid_utf8(mut self, v: InvalidUtf8Policy) -> Self {
        self.invalid_utf8 = v;
        self
    }

    /// Duplicate-object-key strategy. Default [`DuplicateKeyPolicy::Reject`].
    pub fn duplicate_key(mut self, v: DuplicateKeyPolicy) -> Self {
        self.duplicate_key = v;
        self
    }

    /// Trailing-bytes-after-root-value strategy. Default
    /// [`TrailingBytesPolicy::Reject`].
    pub fn trailing_bytes(mut self, v: TrailingBytesPolicy) -> Self {
        self.trailing_bytes = v;
        self
    }

    /// `NaN`/infinity strategy. Default [`NanInfinityPolicy::Reject`].
    pub fn nan_infinity(mut self, v: NanInfinityPolicy) -> Self {
        self.nan_infinity = v;
        self
    }

    /// Unicode normalization strategy. Default
    /// [`UnicodeNormalizationPolicy::None`].
    pub fn unicode_normalization(mut self, v: UnicodeNormalizationPolicy) -> Self {
        self.unicode_normalization = v;
        self
    }

    /// BigNumber-out-of-range strategy. Default
    /// [`BignumberOutOfRangePolicy::Reject`].
    pub fn bignumber_out_of_range(mut self, v: BignumberOutOfRangePolicy) -> Self {
        self.bignumber_out_of_range = v;
        self
    }

    pub(crate) fn max_depth_limit(&self) -> usize {
        self.max_depth
    }
    pub(crate) fn max_container_size_limit(&self) -> usize {
        self.max_container_size
    }
    pub(crate) fn max_string_length_limit(&self) -> usize {
        self.max_string_length
    }
    pub(crate) fn max_document_size_limit(&self) -> usize {
        self.max_document_size
    }
    pub(crate) fn max_bignumber_exponent_limit(&self) -> Option<u64> {
        self.max_bignumber_exponent
    }
    pub(crate) fn max_bignumber_magnitude_bytes_limit(&self) -> Option<usize> {
        self.max_bignumber_magnitude_bytes
    }
    pub(crate) fn nul_in_string_policy(&self) -> NulInStringPolicy {
        self.nul_in_string
    }
    pub(crate) fn invalid_utf8_policy(&self) -> InvalidUtf8Policy {
        self.invalid_utf8
    }
    pub(crate) fn duplicate_key_policy(&self) -> DuplicateKeyPolicy {
        self.duplicate_key
    }
    pub(crate) fn trailing_bytes_policy(&self) -> TrailingBytesPolicy {
        self.trailing_bytes
    }
    pub(crate) fn nan_infinity_policy(&self) -> &NanInfinityPolicy {
        &self.nan_infinity
    }
    pub(crate) fn unicode_normalization_policy(&self) -> UnicodeNormalizationPolicy {
        self.unicode_normalization
    }
    pub(crate) fn bignumber_out_of_range_policy(&self) -> BignumberOutOfRangePolicy {
        self.bignumber_out_of_range
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_bounded_but_permissive() {
        let p = Policy::default();
        assert_eq!(p.max_depth, 512);
        assert_eq!(p.max_container_size, 1_000_000);
        assert_eq!(p.max_string_length, 10_000_000);
        assert_eq!(p.max_document_size, 2_000_000_000);
        assert_eq!(p.max_bignumber_exponent, None);
        assert_eq!(p.duplicate_key, DuplicateKeyPolicy::Reject);
        assert_eq!(p.nan_infinity, NanInfinityPolicy::Reject);
        assert_eq!(p.nul_in_string, NulInStringPolicy::Reject);
    }

    #[test]
    fn builder_chains() {
        let p = Policy::new()
            .max_depth(8)
            .duplicate_key(DuplicateKeyPolicy::KeepLast)
            .nan_infinity(NanInfinityPolicy::Allow);
        assert_eq!(p.max_depth_limit(), 8);
        assert_eq!(p.duplicate_key_policy(), DuplicateKeyPolicy::KeepLast);
        assert_eq!(*p.nan_infinity_policy(), NanInfinityPolicy::Allow);
    }

    #[test]
    fn stringify_carries_custom_strings() {
        let p = Policy::new().nan_infinity(NanInfinityPolicy::Stringify {
            nan: "NaN".into(),
            pos_infinity: "Infinity".into(),
            neg_infinity: "-Infinity".into(),
        });
        match p.nan_infinity_policy() {
            NanInfinityPolicy::Stringify { nan, .. } => assert_eq!(nan, "NaN"),
            other => panic!("unexpected policy {:?}", other),
        }
    }
}
