use chrono::{Local, NaiveDate};

/// Source of "today" for deciding which classes are protected from regeneration.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Pinned date, set through `workspace.select {today}` or `TRAININGD_TODAY`.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_stable() {
        let d = NaiveDate::from_ymd_opt(2024, 6, 15).expect("date");
        let clock = FixedClock(d);
        assert_eq!(clock.today(), d);
        assert_eq!(clock.today(), d);
    }
}
