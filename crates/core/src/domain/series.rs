use crate::curve::FitError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub spend: f64,
    pub output: f64,
}

/// Date-ordered, date-unique daily history for one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalSeries {
    observations: Vec<Observation>,
}

impl HistoricalSeries {
    pub fn new(mut observations: Vec<Observation>) -> Result<Self, FitError> {
        for obs in &observations {
            if !obs.spend.is_finite() || obs.spend < 0.0 {
                return Err(FitError::DegenerateInput {
                    reason: format!("spend on {} must be finite and >= 0 (got {})", obs.date, obs.spend),
                });
            }
            if !obs.output.is_finite() || obs.output < 0.0 {
                return Err(FitError::DegenerateInput {
                    reason: format!("output on {} must be finite and >= 0 (got {})", obs.date, obs.output),
                });
            }
        }

        observations.sort_by_key(|obs| obs.date);
        if let Some(pair) = observations.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(FitError::DegenerateInput {
                reason: format!("duplicate observation date {}", pair[0].date),
            });
        }

        Ok(Self { observations })
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Dates are unique, so this is also the number of observations.
    pub fn distinct_days(&self) -> usize {
        self.observations.len()
    }

    pub fn spends(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.spend).collect()
    }

    pub fn outputs(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.output).collect()
    }

    pub fn latest_spend(&self) -> Option<f64> {
        self.observations.last().map(|o| o.spend)
    }

    /// Observations dated on or before `as_of`.
    pub fn until(&self, as_of: NaiveDate) -> Self {
        Self {
            observations: self
                .observations
                .iter()
                .copied()
                .filter(|o| o.date <= as_of)
                .collect(),
        }
    }

    /// Blended cost per unit of output over the whole series.
    pub fn average_cpa(&self) -> Option<f64> {
        let spend: f64 = self.observations.iter().map(|o| o.spend).sum();
        let output: f64 = self.observations.iter().map(|o| o.output).sum();
        if output > 0.0 {
            crate::numeric::safe_ratio(spend, output)
        } else {
            None
        }
    }
}
