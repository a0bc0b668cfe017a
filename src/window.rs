use chrono::{Days, Months, NaiveDate};

use crate::error::{PairsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookbackUnit {
    Years,
    Months,
    Days,
}

impl std::str::FromStr for LookbackUnit {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "years" => Ok(LookbackUnit::Years),
            "months" => Ok(LookbackUnit::Months),
            "days" => Ok(LookbackUnit::Days),
            _ => Err(()),
        }
    }
}

/// Start and end of the analysis window ending at `end`.
///
/// Month and year steps clamp to the last valid day of the target month
/// (2024-02-29 minus one year is 2023-02-28).
pub fn lookback_window(
    end: NaiveDate,
    duration: u32,
    unit: LookbackUnit,
) -> Result<(NaiveDate, NaiveDate)> {
    let start = match unit {
        LookbackUnit::Years => duration
            .checked_mul(12)
            .and_then(|months| end.checked_sub_months(Months::new(months))),
        LookbackUnit::Months => end.checked_sub_months(Months::new(duration)),
        LookbackUnit::Days => end.checked_sub_days(Days::new(duration as u64)),
    }
    .ok_or_else(|| {
        PairsError::InvalidConfig(format!(
            "look-back of {} {:?} before {} is out of range",
            duration, unit, end
        ))
    })?;
    log::info!(
        "Analysis window {} to {} ({} {:?})",
        start.format("%m/%d/%Y"),
        end.format("%m/%d/%Y"),
        duration,
        unit
    );
    Ok((start, end))
}
