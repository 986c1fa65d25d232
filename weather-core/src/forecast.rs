//! Collapsing 3-hour forecast samples into daily summaries.

use chrono::{DateTime, Days, NaiveDate, Utc};
use std::collections::HashMap;

use crate::model::{CurrentConditions, ForecastDay};

/// Number of future days kept in a report.
pub const DEFAULT_FORECAST_DAYS: usize = 3;

/// One provider forecast entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSample {
    pub timestamp: DateTime<Utc>,
    pub temp_min: f64,
    pub temp_max: f64,
    pub icon: Option<String>,
    pub description: Option<String>,
}

/// Group samples by UTC calendar date and keep the first `max_days` dates
/// after `today`, in encounter order.
///
/// The first sample seen for a date fixes its icon and description; later
/// samples only widen the temperature range.
pub fn aggregate_daily(
    samples: &[ForecastSample],
    today: NaiveDate,
    max_days: usize,
) -> Vec<ForecastDay> {
    let mut days: Vec<ForecastDay> = Vec::new();
    let mut index: HashMap<NaiveDate, usize> = HashMap::new();

    for sample in samples {
        let date = sample.timestamp.date_naive();
        if date <= today {
            continue;
        }

        match index.get(&date) {
            Some(&i) => {
                let day = &mut days[i];
                day.temp_min = day.temp_min.min(sample.temp_min);
                day.temp_max = day.temp_max.max(sample.temp_max);
            }
            None => {
                index.insert(date, days.len());
                days.push(ForecastDay {
                    date,
                    icon: sample.icon.clone(),
                    temp_min: sample.temp_min,
                    temp_max: sample.temp_max,
                    description: sample.description.clone(),
                    placeholder: false,
                });
            }
        }
    }

    days.truncate(max_days);
    days
}

/// Fabricated days seeded from current conditions. Only used when enabled in
/// configuration; every entry is flagged as a placeholder.
pub fn placeholder_days(
    current: &CurrentConditions,
    today: NaiveDate,
    count: usize,
) -> Vec<ForecastDay> {
    let Some(temp) = current.temp else {
        return Vec::new();
    };

    (1..=count as u64)
        .filter_map(|offset| today.checked_add_days(Days::new(offset)))
        .map(|date| ForecastDay {
            date,
            icon: current.icon.clone(),
            temp_min: temp,
            temp_max: temp,
            description: current.description.clone(),
            placeholder: true,
        })
        .collect()
}
