//! Sequence counters with leased persistence.
//!
//! Handing out a value only touches disk when it crosses the current lease;
//! a new lease reserves `cache` values at once. After a restart the counter
//! resumes past the last lease, so values reserved but never handed out are
//! skipped, never reused.

use crate::catalog::SequenceInfo;
use crate::error::{DocqlError, DocqlResult};

#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub info: SequenceInfo,
    /// Last value handed out.
    pub current: Option<i64>,
    /// Furthest value covered by the persisted lease.
    pub lease: Option<i64>,
}

impl Sequence {
    pub fn new(info: SequenceInfo) -> Self {
        Sequence {
            info,
            current: None,
            lease: None,
        }
    }

    /// Sequence restored from a persisted lease.
    pub fn resume(info: SequenceInfo, lease: Option<i64>) -> Self {
        Sequence {
            info,
            current: lease,
            lease,
        }
    }

    /// Next value, plus the lease to persist when the value crossed the
    /// previous one.
    pub fn next(&mut self) -> DocqlResult<(i64, Option<i64>)> {
        let info = &self.info;
        let asc = info.increment > 0;
        let mut wrapped = false;
        let value = match self.current {
            None => info.start,
            Some(cur) => match cur.checked_add(info.increment) {
                Some(v) if v >= info.min && v <= info.max => v,
                _ if info.cycle => {
                    wrapped = true;
                    if asc { info.min } else { info.max }
                }
                _ => {
                    return Err(DocqlError::SequenceExhausted {
                        name: info.name.clone(),
                        bound: if asc { "maximum" } else { "minimum" },
                        value: if asc { info.max } else { info.min },
                    });
                }
            },
        };

        let needs_lease = wrapped
            || match self.lease {
                None => true,
                Some(lease) if asc => value > lease,
                Some(lease) => value < lease,
            };
        let new_lease = if needs_lease {
            let span = info
                .increment
                .saturating_mul(info.cache.saturating_sub(1) as i64);
            let lease = value.saturating_add(span).clamp(info.min, info.max);
            self.lease = Some(lease);
            Some(lease)
        } else {
            None
        };
        self.current = Some(value);
        Ok((value, new_lease))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(increment: i64, min: i64, max: i64, cycle: bool) -> Sequence {
        Sequence::new(SequenceInfo {
            increment,
            min,
            max,
            start: if increment > 0 { min } else { max },
            cycle,
            ..SequenceInfo::new("s")
        })
    }

    #[test]
    fn first_value_is_start() {
        let mut s = seq(1, 1, 10, false);
        assert_eq!(s.next().unwrap(), (1, Some(1)));
        assert_eq!(s.next().unwrap(), (2, Some(2)));
    }

    #[test]
    fn bounds_are_enforced() {
        let mut s = seq(1, 1, 10, false);
        s.current = Some(9);
        assert_eq!(s.next().unwrap().0, 10);
        assert!(matches!(s.next(), Err(DocqlError::SequenceExhausted { .. })));

        let mut s = seq(-1, 1, 10, false);
        s.current = Some(1);
        assert!(s.next().is_err());
    }

    #[test]
    fn cycle_wraps_to_opposite_bound() {
        let mut s = seq(1, 1, 10, true);
        s.current = Some(10);
        assert_eq!(s.next().unwrap().0, 1);

        let mut s = seq(-1, 1, 10, true);
        s.current = Some(1);
        assert_eq!(s.next().unwrap().0, 10);
    }

    #[test]
    fn cache_amortizes_leases() {
        let mut s = seq(1, 1, i64::MAX, false);
        s.info.cache = 5;
        assert_eq!(s.next().unwrap(), (1, Some(5)));
        for want in 2..=5 {
            assert_eq!(s.next().unwrap(), (want, None));
        }
        assert_eq!(s.next().unwrap(), (6, Some(10)));
    }

    #[test]
    fn resume_skips_leased_values() {
        let mut info = SequenceInfo::new("s");
        info.cache = 10;
        let mut s = Sequence::resume(info, Some(10));
        assert_eq!(s.next().unwrap(), (11, Some(20)));
    }
}
