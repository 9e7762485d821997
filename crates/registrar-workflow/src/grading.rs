// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Score validation and grade derivation.

use registrar_core::error::{RegistrarError, Result};
use registrar_core::types::{Grade, Scores};

/// Highest continuous-assessment score.
pub const MAX_CA: f64 = 40.0;
/// Highest examination score.
pub const MAX_EXAM: f64 = 70.0;
/// Highest combined total.
pub const MAX_TOTAL: f64 = 100.0;

/// Reject negative, non-finite, or out-of-range scores.
pub fn validate(scores: &Scores) -> Result<()> {
    for (name, value, max) in [("ca", scores.ca, MAX_CA), ("exam", scores.exam, MAX_EXAM)] {
        if !value.is_finite() {
            return Err(RegistrarError::InvalidScores(format!("{name} score is not a number")));
        }
        if !(0.0..=max).contains(&value) {
            return Err(RegistrarError::InvalidScores(format!(
                "{name} score {value} outside 0..={max}"
            )));
        }
    }
    let total = scores.ca + scores.exam;
    if total > MAX_TOTAL {
        return Err(RegistrarError::InvalidScores(format!(
            "total {total} exceeds {MAX_TOTAL}"
        )));
    }
    Ok(())
}

pub fn total(scores: &Scores) -> f64 {
    scores.ca + scores.exam
}

/// Letter grade for a total score.
pub fn grade_for(total: f64) -> Grade {
    match total {
        t if t >= 70.0 => Grade::A,
        t if t >= 60.0 => Grade::B,
        t if t >= 50.0 => Grade::C,
        t if t >= 45.0 => Grade::D,
        t if t >= 40.0 => Grade::E,
        _ => Grade::F,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_boundaries() {
        assert_eq!(grade_for(100.0), Grade::A);
        assert_eq!(grade_for(70.0), Grade::A);
        assert_eq!(grade_for(69.9), Grade::B);
        assert_eq!(grade_for(60.0), Grade::B);
        assert_eq!(grade_for(55.0), Grade::C);
        assert_eq!(grade_for(45.0), Grade::D);
        assert_eq!(grade_for(40.0), Grade::E);
        assert_eq!(grade_for(39.5), Grade::F);
        assert_eq!(grade_for(0.0), Grade::F);
    }

    #[test]
    fn valid_scores_pass() {
        validate(&Scores { ca: 23.0, exam: 32.0 }).unwrap();
        validate(&Scores { ca: 0.0, exam: 0.0 }).unwrap();
        validate(&Scores { ca: 30.0, exam: 70.0 }).unwrap();
    }

    #[test]
    fn out_of_range_scores_fail() {
        for scores in [
            Scores { ca: -1.0, exam: 10.0 },
            Scores { ca: 41.0, exam: 10.0 },
            Scores { ca: 10.0, exam: 71.0 },
            Scores { ca: 40.0, exam: 70.0 },
            Scores { ca: f64::NAN, exam: 10.0 },
            Scores { ca: 10.0, exam: f64::INFINITY },
        ] {
            assert!(
                matches!(validate(&scores), Err(RegistrarError::InvalidScores(_))),
                "{scores:?}"
            );
        }
    }
}
