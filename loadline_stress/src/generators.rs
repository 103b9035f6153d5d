//! Synthetic sensor readings.
use std::ops::RangeInclusive;

use chrono::{DateTime, Duration, Utc};
use loadline_storage::Point;
use rand::{Rng, SeedableRng, rngs::StdRng};

/// A kind of sensor reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub name: &'static str,
    pub tag_prefix: &'static str,
    pub min: f64,
    pub max: f64,
}

pub const MEASUREMENTS: [Measurement; 10] = [
    Measurement::new("temperature", "tmp", 0.0, 100.0),
    Measurement::new("humidity", "hum", 0.0, 100.0),
    Measurement::new("light", "lght", 0.0, 100_000.0),
    Measurement::new("CO2", "cdx", 400.0, 10_000.0),
    Measurement::new("windSpeed", "wnds", 0.0, 30.0),
    Measurement::new("rainfall", "rnfl", 0.0, 200.0),
    Measurement::new("soilTemperature", "stmp", -10.0, 40.0),
    Measurement::new("leafWetness", "lfwn", 0.0, 15.0),
    Measurement::new("pressure", "pres", 0.0, 1050.0),
    Measurement::new("frequency", "frqn", 0.0, 60.0),
];

const TAG_NUMBERS: RangeInclusive<u32> = 1..=1001;

/// Generates one reading per measurement for every sampled instant.
pub struct SampleGenerator {
    rng: StdRng,
}

/// Walks a time range, producing payloads of a requested size.
pub struct BatchCursor {
    next_timestamp: DateTime<Utc>,
    step: Duration,
}

impl Measurement {
    const fn new(name: &'static str, tag_prefix: &'static str, min: f64, max: f64) -> Self {
        Self {
            name,
            tag_prefix,
            min,
            max,
        }
    }
}

impl SampleGenerator {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self { rng }
    }

    /// One reading per measurement, all at `timestamp`.
    pub fn sample(&mut self, timestamp: DateTime<Utc>) -> Vec<Point> {
        MEASUREMENTS
            .iter()
            .map(|measurement| self.reading(measurement, timestamp))
            .collect()
    }

    /// A random payload size in `range`.
    pub fn rows(&mut self, range: &RangeInclusive<usize>) -> usize {
        self.rng.random_range(range.clone())
    }

    fn reading(&mut self, measurement: &Measurement, timestamp: DateTime<Utc>) -> Point {
        let tag_number = self.rng.random_range(TAG_NUMBERS);
        let value = self.rng.random_range(measurement.min..=measurement.max);

        Point::new(
            measurement.name,
            format!("{}_{tag_number:04}", measurement.tag_prefix),
            (value * 100.0).round() / 100.0,
            timestamp,
        )
    }
}

impl BatchCursor {
    pub fn new(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            next_timestamp: start,
            step,
        }
    }

    pub fn next_timestamp(&self) -> DateTime<Utc> {
        self.next_timestamp
    }

    /// Generate exactly `rows` points, sampling every `step` from where the
    /// previous payload stopped.
    pub fn next_payload(&mut self, generator: &mut SampleGenerator, rows: usize) -> Vec<Point> {
        let mut points = Vec::with_capacity(rows + MEASUREMENTS.len());

        while points.len() < rows {
            points.extend(generator.sample(self.next_timestamp));
            self.next_timestamp += self.step;
        }

        points.truncate(rows);
        points
    }
}
