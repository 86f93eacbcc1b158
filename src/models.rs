use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, TrackerError};

pub const MAX_DAILY_HOURS: f64 = 24.0;

/// One immutable daily habit log. The store key (`date_key`) lives outside
/// the entry; its first 8 characters are always a `YYYYMMDD` date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLogEntry {
    pub current_grade: f64,
    pub target_grade: f64,
    pub study_hours: f64,
    pub sleep_hours: f64,
    pub physical_hours: f64,
    pub leisure_hours: f64,
    pub timestamp: String,
}

impl DailyLogEntry {
    pub fn hour_features(&self) -> [f64; 4] {
        [
            self.study_hours,
            self.sleep_hours,
            self.physical_hours,
            self.leisure_hours,
        ]
    }

    pub fn grade_gap(&self) -> f64 {
        self.target_grade - self.current_grade
    }
}

/// Raw caller input for one daily log, validated before any store write.
#[derive(Debug, Clone, Copy)]
pub struct LogSubmission {
    pub current_grade: f64,
    pub target_grade: f64,
    pub study: f64,
    pub sleep: f64,
    pub physical: f64,
    pub leisure: f64,
}

impl LogSubmission {
    pub fn into_entry(self) -> Result<DailyLogEntry> {
        let hours = [self.study, self.sleep, self.physical, self.leisure];
        let finite = hours.iter().all(|h| h.is_finite() && *h >= 0.0)
            && self.current_grade.is_finite()
            && self.target_grade.is_finite();
        if !finite {
            return Err(TrackerError::Validation("Invalid numeric values".into()));
        }
        if self.current_grade > self.target_grade {
            return Err(TrackerError::Validation(
                "Current grade cannot be greater than target grade".into(),
            ));
        }
        if hours.iter().sum::<f64>() > MAX_DAILY_HOURS {
            return Err(TrackerError::Validation("Total hours exceed 24".into()));
        }

        Ok(DailyLogEntry {
            current_grade: self.current_grade,
            target_grade: self.target_grade,
            study_hours: self.study,
            sleep_hours: self.sleep,
            physical_hours: self.physical,
            leisure_hours: self.leisure,
            timestamp: Utc::now().to_rfc3339(),
        })
    }
}

/// Storage namespace for a user, shared by the log store, the dataset file
/// and the model file. Always derive it through this function.
pub fn user_key(email: &str) -> String {
    if email.is_empty() {
        return "unknown_user".to_string();
    }
    email.replace('.', "_")
}

pub fn date_key_at(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S_%6f").to_string()
}

pub fn date_key_now() -> String {
    date_key_at(Utc::now())
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize)]
pub struct LongPrediction {
    pub predicted_grade_gap: f64,
    pub required_additional_study_hours: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyPrediction {
    pub predicted_gap_week: f64,
    pub required_hours_week: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> LogSubmission {
        LogSubmission {
            current_grade: 60.0,
            target_grade: 80.0,
            study: 2.0,
            sleep: 7.0,
            physical: 1.0,
            leisure: 2.0,
        }
    }

    #[test]
    fn user_key_replaces_dots() {
        assert_eq!(user_key("avery.lee@example.com"), "avery_lee@example_com");
    }

    #[test]
    fn user_key_handles_empty_email() {
        assert_eq!(user_key(""), "unknown_user");
    }

    #[test]
    fn date_key_is_sortable_and_date_prefixed() {
        let key = date_key_now();
        assert_eq!(key.len(), "YYYYMMDD_HHMMSS_ffffff".len());
        assert!(key[..8].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(&key[8..9], "_");
    }

    #[test]
    fn valid_submission_becomes_entry() {
        let entry = submission().into_entry().unwrap();
        assert_eq!(entry.grade_gap(), 20.0);
        assert_eq!(entry.hour_features(), [2.0, 7.0, 1.0, 2.0]);
        assert!(!entry.timestamp.is_empty());
    }

    #[test]
    fn boundary_values_are_accepted() {
        let mut s = submission();
        s.current_grade = 80.0; // equal grades are fine
        s.study = 10.0;
        s.sleep = 10.0;
        s.physical = 2.0;
        s.leisure = 2.0; // sum is exactly 24
        assert!(s.into_entry().is_ok());
    }

    #[test]
    fn rejects_inverted_grades() {
        let mut s = submission();
        s.current_grade = 90.0;
        let err = s.into_entry().unwrap_err();
        assert!(err.is_refusal());
        assert_eq!(
            err.to_string(),
            "Current grade cannot be greater than target grade"
        );
    }

    #[test]
    fn rejects_hour_overflow() {
        let mut s = submission();
        s.sleep = 22.0;
        let err = s.into_entry().unwrap_err();
        assert_eq!(err.to_string(), "Total hours exceed 24");
    }

    #[test]
    fn rejects_non_finite_and_negative_hours() {
        let mut s = submission();
        s.study = f64::NAN;
        assert!(s.into_entry().is_err());

        let mut s = submission();
        s.leisure = -1.0;
        assert!(s.into_entry().is_err());
    }

    #[test]
    fn round2_rounds_half_up() {
        assert_eq!(round2(1.005), 1.0); // 1.005 is stored below .005
        assert_eq!(round2(2.675000001), 2.68);
        assert_eq!(round2(-0.125), -0.13);
        assert_eq!(round2(4.0), 4.0);
    }
}
