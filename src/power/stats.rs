//! Summary statistics over power readings

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsError {
    #[error("input array must have at least 1 element")]
    EmptyInput,
}

fn non_empty(input: &[f64]) -> Result<&[f64], StatsError> {
    if input.is_empty() {
        Err(StatsError::EmptyInput)
    } else {
        Ok(input)
    }
}

pub fn min(input: &[f64]) -> Result<f64, StatsError> {
    Ok(non_empty(input)?.iter().copied().fold(f64::INFINITY, f64::min))
}

pub fn max(input: &[f64]) -> Result<f64, StatsError> {
    Ok(non_empty(input)?
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max))
}

pub fn mean(input: &[f64]) -> Result<f64, StatsError> {
    let input = non_empty(input)?;
    Ok(input.iter().sum::<f64>() / input.len() as f64)
}

/// Population standard deviation (divides by N)
pub fn std_dev(input: &[f64]) -> Result<f64, StatsError> {
    let mean = mean(input)?;
    let variance = input.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / input.len() as f64;
    Ok(variance.sqrt())
}

/// Middle value of a sorted copy; mean of the two middle values for even lengths
pub fn median(input: &[f64]) -> Result<f64, StatsError> {
    let mut sorted = non_empty(input)?.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Ok(sorted[mid])
    } else {
        Ok((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}
