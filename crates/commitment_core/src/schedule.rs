//! crates/commitment_core/src/schedule.rs
//!
//! Recurrence handling: weekday token normalization, scheduled-date
//! membership, and the idempotent per-date completion upsert.

use chrono::{Datelike, FixedOffset, NaiveDate, Weekday};

use crate::domain::{Completion, Proof, Recurrence};
use crate::error::CommitmentError;

/// Canonical lowercase full name of a weekday.
pub fn day_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Maps a single user-supplied token to a weekday. Accepts three-letter
/// abbreviations and full names, case-insensitive.
pub fn day_from_token(token: &str) -> Option<Weekday> {
    match token.to_ascii_lowercase().as_str() {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Parses a comma-separated weekday list (e.g. "mon,Wed, friday") into a
/// deduplicated, Monday-first set.
///
/// Fails with `InvalidDays` naming exactly the tokens that did not map to a
/// weekday. There are no implicit default days, so an empty input is one
/// invalid token.
pub fn parse_days(input: &str) -> Result<Vec<Weekday>, CommitmentError> {
    let mut days: Vec<Weekday> = Vec::new();
    let mut invalid: Vec<String> = Vec::new();

    for token in input.split(',') {
        let token = token.trim();
        match day_from_token(token) {
            Some(day) => {
                if !days.contains(&day) {
                    days.push(day);
                }
            }
            None => invalid.push(token.to_string()),
        }
    }

    if !invalid.is_empty() {
        return Err(CommitmentError::InvalidDays { tokens: invalid });
    }

    days.sort_by_key(|day| day.num_days_from_monday());
    Ok(days)
}

impl Recurrence {
    /// True iff `date` is a scheduled occurrence: its weekday is in `days`
    /// and the end date, when present, has not passed. The cutoff is at day
    /// granularity in the reference timezone, so the end date's own
    /// calendar day is still scheduled and the next day is not.
    pub fn is_scheduled_on(&self, date: NaiveDate, tz: FixedOffset) -> bool {
        if !self.days.contains(&date.weekday()) {
            return false;
        }
        match self.end_date {
            None => true,
            Some(end) => date <= end.with_timezone(&tz).date_naive(),
        }
    }

    /// Records the verdict for a calendar date, overwriting any verdict and
    /// proof already recorded for that date.
    ///
    /// Dates outside the scheduled weekdays are recorded too; membership is
    /// evaluated when listing and aggregating, not on write.
    pub fn upsert_completion(
        &mut self,
        date: NaiveDate,
        completed: bool,
        proof: Option<Proof>,
    ) -> &Completion {
        let entry = self.completions.entry(date).or_default();
        entry.completed = completed;
        entry.proof = proof;
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Confidence, ProofAnalysis};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn tz() -> FixedOffset {
        FixedOffset::east_opt(-5 * 3600).unwrap()
    }

    fn recurrence(days: Vec<Weekday>) -> Recurrence {
        Recurrence {
            days,
            end_date: None,
            completions: BTreeMap::new(),
        }
    }

    fn proof(valid: bool) -> Proof {
        Proof {
            image_url: "https://example.com/proof.png".to_string(),
            extracted_text: String::new(),
            analysis: ProofAnalysis {
                is_valid: valid,
                explanation: "test".to_string(),
                confidence: Confidence::High,
            },
            verified_at: Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).unwrap(),
        }
    }

    // 2024-01-15 is a Monday.
    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn tokens_normalize_across_case_and_abbreviation() {
        assert_eq!(
            parse_days("MON,Tuesday, wed").unwrap(),
            vec![Weekday::Mon, Weekday::Tue, Weekday::Wed]
        );
    }

    #[test]
    fn every_abbreviation_and_full_name_maps() {
        let days = parse_days("mon,tue,wed,thu,fri,sat,sun").unwrap();
        let full = parse_days("monday,tuesday,wednesday,thursday,friday,saturday,sunday").unwrap();
        assert_eq!(days, full);
        assert_eq!(days.len(), 7);
    }

    #[test]
    fn invalid_tokens_are_reported_verbatim() {
        let err = parse_days("mon,funday,xyz").unwrap_err();
        match err {
            CommitmentError::InvalidDays { tokens } => {
                assert_eq!(tokens, vec!["funday".to_string(), "xyz".to_string()]);
            }
            other => panic!("expected InvalidDays, got {other:?}"),
        }
    }

    #[test]
    fn empty_input_is_invalid() {
        assert!(matches!(
            parse_days(""),
            Err(CommitmentError::InvalidDays { .. })
        ));
    }

    #[test]
    fn duplicates_collapse_and_order_is_monday_first() {
        assert_eq!(
            parse_days("sun,wed,mon,monday").unwrap(),
            vec![Weekday::Mon, Weekday::Wed, Weekday::Sun]
        );
    }

    #[test]
    fn scheduling_follows_weekday_membership() {
        let rec = recurrence(vec![Weekday::Mon, Weekday::Wed]);
        assert!(rec.is_scheduled_on(date(15), tz())); // Monday
        assert!(!rec.is_scheduled_on(date(16), tz())); // Tuesday
        assert!(rec.is_scheduled_on(date(17), tz())); // Wednesday
    }

    #[test]
    fn end_date_cuts_off_the_day_after_at_day_granularity() {
        let mut rec = recurrence(vec![Weekday::Mon, Weekday::Wed, Weekday::Thu]);
        // End date falls mid-morning local time on Wednesday the 17th.
        rec.end_date = Some(
            tz().with_ymd_and_hms(2024, 1, 17, 10, 0, 0)
                .single()
                .unwrap()
                .with_timezone(&Utc),
        );
        assert!(rec.is_scheduled_on(date(15), tz()));
        assert!(rec.is_scheduled_on(date(17), tz())); // the end date's own day
        assert!(!rec.is_scheduled_on(date(18), tz())); // the day after
    }

    #[test]
    fn upserting_twice_for_one_date_keeps_a_single_entry() {
        let mut rec = recurrence(vec![Weekday::Mon]);
        rec.upsert_completion(date(15), false, Some(proof(false)));
        rec.upsert_completion(date(15), true, Some(proof(true)));

        assert_eq!(rec.completions.len(), 1);
        let entry = &rec.completions[&date(15)];
        assert!(entry.completed);
        assert!(entry.proof.as_ref().unwrap().analysis.is_valid);
    }

    #[test]
    fn records_completion_on_unscheduled_date() {
        // Writes are not rejected for off-schedule days; membership only
        // matters at read time.
        let mut rec = recurrence(vec![Weekday::Mon]);
        rec.upsert_completion(date(16), true, Some(proof(true))); // Tuesday
        assert_eq!(rec.completions.len(), 1);
        assert!(rec.completions.contains_key(&date(16)));
        assert!(!rec.is_scheduled_on(date(16), tz()));
    }

    #[test]
    fn day_names_are_canonical_lowercase() {
        assert_eq!(day_name(Weekday::Mon), "monday");
        assert_eq!(day_name(Weekday::Sun), "sunday");
    }
}
