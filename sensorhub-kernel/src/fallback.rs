//! Synthetic readings used whenever the board cannot be reached.

use crate::models::{Reading, ReadingSource};
use rand::Rng;
use std::ops::RangeInclusive;
use time::OffsetDateTime;

pub const TEMPERATURE_RANGE: RangeInclusive<f64> = 20.0..=30.0;
pub const HUMIDITY_RANGE: RangeInclusive<f64> = 30.0..=70.0;
pub const LIGHT_RANGE: RangeInclusive<f64> = 0.0..=100.0;
pub const SMOKE_RANGE: RangeInclusive<f64> = 0.0..=50.0;

pub fn synthetic_reading() -> Reading {
    synthetic_reading_with(&mut rand::thread_rng())
}

/// Uniform values in the documented ranges, stamped now
pub fn synthetic_reading_with<R: Rng + ?Sized>(rng: &mut R) -> Reading {
    Reading {
        temperature: rng.gen_range(TEMPERATURE_RANGE),
        humidity: rng.gen_range(HUMIDITY_RANGE),
        light: rng.gen_range(LIGHT_RANGE),
        smoke: rng.gen_range(SMOKE_RANGE),
        timestamp: OffsetDateTime::now_utc(),
        source: ReadingSource::Synthetic,
    }
}

#[cfg(test)]
pub(crate) fn assert_in_synthetic_ranges(reading: &Reading) {
    assert!(TEMPERATURE_RANGE.contains(&reading.temperature), "temperature {}", reading.temperature);
    assert!(HUMIDITY_RANGE.contains(&reading.humidity), "humidity {}", reading.humidity);
    assert!(LIGHT_RANGE.contains(&reading.light), "light {}", reading.light);
    assert!(SMOKE_RANGE.contains(&reading.smoke), "smoke {}", reading.smoke);
    assert_eq!(reading.source, ReadingSource::Synthetic);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_values_stay_in_ranges() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            assert_in_synthetic_ranges(&synthetic_reading_with(&mut rng));
        }
    }

    #[test]
    fn test_same_seed_same_values() {
        let a = synthetic_reading_with(&mut StdRng::seed_from_u64(42));
        let b = synthetic_reading_with(&mut StdRng::seed_from_u64(42));
        assert_eq!(
            (a.temperature, a.humidity, a.light, a.smoke),
            (b.temperature, b.humidity, b.light, b.smoke)
        );
    }

    #[test]
    fn test_timestamp_is_now() {
        let before = OffsetDateTime::now_utc();
        let reading = synthetic_reading();
        let after = OffsetDateTime::now_utc();
        assert!(reading.timestamp >= before && reading.timestamp <= after);
    }
}
