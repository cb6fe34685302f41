//! Identifier Generation
//!
//! Form ids are canonical UUID text. New ids come from an injectable
//! `IdGenerator`; when no secure randomness is available the store falls
//! back to a `<millis><suffix>` id, which is deliberately not a UUID.

use crate::clock::Clock;
use rand::rngs::{OsRng, StdRng};
use rand::{Rng, RngCore, SeedableRng};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::{Uuid, Variant};

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Length of canonical hyphenated UUID text
pub const UUID_TEXT_LEN: usize = 36;

/// Byte offsets of the hyphens in canonical UUID text
const UUID_HYPHEN_OFFSETS: [usize; 4] = [8, 13, 18, 23];

/// Length of the random suffix on fallback ids
pub const FALLBACK_SUFFIX_LEN: usize = 6;

const BASE36_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Mixed into the fallback seed so ids made at the same instant differ
static FALLBACK_SEQUENCE: AtomicU64 = AtomicU64::new(0);

// =============================================================================
// Generators
// =============================================================================

/// Source of fresh identifiers
pub trait IdGenerator: Send + Sync + Debug {
    /// A new UUID, or `None` when randomness is unavailable.
    fn new_id(&self) -> Option<Uuid>;
}

/// Random v4 UUIDs from the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn new_id(&self) -> Option<Uuid> {
        let mut bytes = [0u8; 16];
        OsRng.try_fill_bytes(&mut bytes).ok()?;
        Some(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }
}

/// Deterministic v4-shaped UUIDs for tests: 1, 2, 3, ...
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn new_id(&self) -> Option<Uuid> {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        let mut bytes = [0u8; 16];
        bytes[8..].copy_from_slice(&n.to_be_bytes());
        Some(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }
}

// =============================================================================
// Assignment
// =============================================================================

/// Produce a new id string, falling back to a timestamp id when the
/// generator has no randomness to offer.
pub fn assign_id(ids: &dyn IdGenerator, clock: &dyn Clock) -> String {
    match ids.new_id() {
        Some(id) => id.to_string(),
        None => {
            let id = fallback_id(clock);
            tracing::warn!(id = %id, "UUID generation unavailable, using fallback id");
            id
        }
    }
}

/// `<unix millis><6 base36 chars>`; not a canonical UUID.
///
/// The suffix comes from a seed of the clock, a process-wide sequence and
/// the process id, so it needs no OS randomness.
pub fn fallback_id(clock: &dyn Clock) -> String {
    let now = clock.now();
    let nanos = now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp_millis());
    let sequence = FALLBACK_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let seed = (nanos as u64)
        ^ sequence.wrapping_mul(0x9e37_79b9_7f4a_7c15)
        ^ u64::from(std::process::id());
    let mut rng = StdRng::seed_from_u64(seed);
    let suffix: String = (0..FALLBACK_SUFFIX_LEN)
        .map(|_| BASE36_ALPHABET[rng.gen_range(0..BASE36_ALPHABET.len())] as char)
        .collect();
    format!("{}{}", now.timestamp_millis(), suffix)
}

// =============================================================================
// Validation
// =============================================================================

/// True for hyphenated 36-character UUID text with an RFC 4122 variant and a
/// version in 1..=8, or for the nil and max UUIDs.
pub fn is_canonical_uuid(text: &str) -> bool {
    if text.len() != UUID_TEXT_LEN {
        return false;
    }
    let shape_ok = text.bytes().enumerate().all(|(i, b)| {
        if UUID_HYPHEN_OFFSETS.contains(&i) {
            b == b'-'
        } else {
            b.is_ascii_hexdigit()
        }
    });
    if !shape_ok {
        return false;
    }

    match Uuid::try_parse(text) {
        Ok(uuid) => {
            uuid.is_nil()
                || uuid.as_bytes() == &[0xff; 16]
                || ((1..=8).contains(&uuid.get_version_num())
                    && uuid.get_variant() == Variant::RFC4122)
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[derive(Debug)]
    struct NoRandomness;

    impl IdGenerator for NoRandomness {
        fn new_id(&self) -> Option<Uuid> {
            None
        }
    }

    #[test]
    fn test_canonical_uuid_accepts() {
        assert!(is_canonical_uuid("9b2f4b1e-3c1d-4f7a-8e2b-1a2b3c4d5e6f"));
        assert!(is_canonical_uuid("9B2F4B1E-3C1D-4F7A-8E2B-1A2B3C4D5E6F"));
        assert!(is_canonical_uuid("00000000-0000-0000-0000-000000000000"));
        assert!(is_canonical_uuid("ffffffff-ffff-ffff-ffff-ffffffffffff"));
    }

    #[test]
    fn test_canonical_uuid_rejects() {
        assert!(!is_canonical_uuid("not-a-uuid"));
        assert!(!is_canonical_uuid(""));
        // simple (unhyphenated) form
        assert!(!is_canonical_uuid("9b2f4b1e3c1d4f7a8e2b1a2b3c4d5e6f"));
        // braced form
        assert!(!is_canonical_uuid("{9b2f4b1e-3c1d-4f7a-8e2b-1a2b3c4d5e6f}"));
        // version 0
        assert!(!is_canonical_uuid("9b2f4b1e-3c1d-0f7a-8e2b-1a2b3c4d5e6f"));
        // NCS variant
        assert!(!is_canonical_uuid("9b2f4b1e-3c1d-4f7a-0e2b-1a2b3c4d5e6f"));
    }

    #[test]
    fn test_random_ids_are_canonical_and_distinct() {
        let a = RandomIds.new_id().unwrap().to_string();
        let b = RandomIds.new_id().unwrap().to_string();
        assert!(is_canonical_uuid(&a));
        assert!(is_canonical_uuid(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialIds::new();
        let first = ids.new_id().unwrap().to_string();
        let second = ids.new_id().unwrap().to_string();
        assert!(is_canonical_uuid(&first));
        assert_ne!(first, second);
    }

    #[test]
    fn test_assign_id_falls_back() {
        let clock = ManualClock::new();
        let id = assign_id(&NoRandomness, &clock);

        assert!(!is_canonical_uuid(&id));
        assert!(id.starts_with(&clock.now_ms().to_string()));
        assert_eq!(id.len(), clock.now_ms().to_string().len() + FALLBACK_SUFFIX_LEN);
    }

    #[test]
    fn test_fallback_ids_differ_at_same_instant() {
        let clock = ManualClock::new();

        let a = fallback_id(&clock);
        let b = fallback_id(&clock);
        let c = assign_id(&NoRandomness, &clock);

        assert!(a.starts_with(&clock.now_ms().to_string()));
        assert!(b.starts_with(&clock.now_ms().to_string()));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }
}
