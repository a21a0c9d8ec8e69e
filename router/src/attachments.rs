// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Router attachments: named singletons shared across a router's elements.
//!
//! Information elements (scheduling parameters, thread pinning, annotation
//! claims) populate these tables during their configure phase; consumers
//! read them at initialize time. Attachments are owned by the router,
//! discovered by name, and never process globals.

use parking_lot::Mutex;

/// Fraction bits of the fixed-point scheduling factors.
pub const FRAC_BITS: u32 = 10;

/// Attachment name of the [`ScheduleInfoTable`].
pub const SCHEDULE_INFO: &str = "ScheduleInfo";
/// Attachment name of the [`ThreadSchedTable`].
pub const THREAD_SCHED: &str = "StaticThreadSched";
/// Attachment name of the [`AnnotationClaims`] table.
pub const ANNOTATION_INFO: &str = "AnnotationInfo";

/// Per-element scheduling factors, keyed by element name or name prefix.
///
/// Factors are fixed point with [`FRAC_BITS`] fraction bits and compose
/// multiplicatively: a factor registered for `c` scales every element named
/// `c/...`, so an outer 4 and an inner 0.5 yield an effective 2.
#[derive(Debug, Default)]
pub struct ScheduleInfoTable {
    entries: Mutex<Vec<(String, u64)>>,
}

impl ScheduleInfoTable {
    /// Record `factor` (fixed point) for `pattern` (an element name or a
    /// compound prefix).
    pub fn insert(&self, pattern: &str, factor: u64) {
        self.entries.lock().push((pattern.to_string(), factor));
    }

    /// The composed fixed-point factor for the element named `name`.
    #[must_use]
    pub fn factor_for(&self, name: &str) -> u64 {
        let mut acc = 1u64 << FRAC_BITS;
        for (pattern, factor) in &*self.entries.lock() {
            let applies = pattern == name
                || (name.len() > pattern.len()
                    && name.starts_with(pattern.as_str())
                    && name.as_bytes()[pattern.len()] == b'/');
            if applies {
                acc = acc.saturating_mul(*factor) >> FRAC_BITS;
            }
        }
        acc
    }
}

/// Element-to-thread pinning, keyed by element name.
#[derive(Debug, Default)]
pub struct ThreadSchedTable {
    entries: Mutex<Vec<(String, usize)>>,
}

impl ThreadSchedTable {
    /// Pin `name`'s tasks and timers to `thread`.
    pub fn insert(&self, name: &str, thread: usize) {
        self.entries.lock().push((name.to_string(), thread));
    }

    /// The pinned thread for `name`, if any.
    #[must_use]
    pub fn thread_for(&self, name: &str) -> Option<usize> {
        self.entries
            .lock()
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, t)| *t)
    }
}

/// Named claims over annotation byte ranges, checked for overlap.
#[derive(Debug, Default)]
pub struct AnnotationClaims {
    claims: Mutex<Vec<(String, usize, usize)>>,
}

impl AnnotationClaims {
    /// Claim `[offset, offset+len)` under `name`. Re-claiming the same name
    /// with the same range is fine; overlap with a different claim is an
    /// error naming the prior owner.
    pub fn claim(&self, name: &str, offset: usize, len: usize) -> Result<(), String> {
        let mut claims = self.claims.lock();
        for (other, ooff, olen) in &*claims {
            let disjoint = offset + len <= *ooff || *ooff + *olen <= offset;
            if other == name && *ooff == offset && *olen == len {
                return Ok(());
            }
            if !disjoint {
                return Err(format!(
                    "annotation bytes {offset}..{} overlap '{other}' ({ooff}..{})",
                    offset + len,
                    ooff + olen
                ));
            }
        }
        claims.push((name.to_string(), offset, len));
        Ok(())
    }

    /// Look up a claim by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<(usize, usize)> {
        self.claims
            .lock()
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, off, len)| (*off, *len))
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn schedule_factors_compose_by_prefix() {
        let table = ScheduleInfoTable::default();
        table.insert("c", 4 << FRAC_BITS);
        table.insert("c/i", 1 << (FRAC_BITS - 1)); // 0.5
        assert_eq!(table.factor_for("c/i"), 2 << FRAC_BITS);
        assert_eq!(table.factor_for("c/j"), 4 << FRAC_BITS);
        assert_eq!(table.factor_for("cx"), 1 << FRAC_BITS);
    }

    #[test]
    fn annotation_claims_reject_overlap() {
        let claims = AnnotationClaims::default();
        claims.claim("dst_ip", 0, 4).unwrap();
        claims.claim("paint", 8, 1).unwrap();
        assert!(claims.claim("rogue", 2, 4).is_err());
        // idempotent re-claim
        claims.claim("paint", 8, 1).unwrap();
        assert_eq!(claims.find("dst_ip"), Some((0, 4)));
    }

    #[test]
    fn thread_pinning_last_wins() {
        let table = ThreadSchedTable::default();
        table.insert("q", 1);
        table.insert("q", 2);
        assert_eq!(table.thread_for("q"), Some(2));
        assert_eq!(table.thread_for("other"), None);
    }
}
