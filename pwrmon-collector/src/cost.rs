use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Aggregation windows. A month is billed as 30 days regardless of the
/// calendar month its bucket starts in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Minute,
    Hour,
    Day,
    Month,
}

impl Period {
    pub const ALL: [Period; 4] = [Period::Minute, Period::Hour, Period::Day, Period::Month];

    pub fn hours(&self) -> f64 {
        match self {
            Period::Minute => 1.0 / 60.0,
            Period::Hour => 1.0,
            Period::Day => 24.0,
            Period::Month => 24.0 * 30.0,
        }
    }

    /// Start of the bucket `at` falls into
    pub fn bucket_start(&self, at: NaiveDateTime) -> NaiveDateTime {
        let date = at.date();
        let start = match self {
            Period::Minute => {
                NaiveTime::from_hms_opt(at.hour(), at.minute(), 0).map(|t| date.and_time(t))
            }
            Period::Hour => NaiveTime::from_hms_opt(at.hour(), 0, 0).map(|t| date.and_time(t)),
            Period::Day => Some(date.and_time(NaiveTime::MIN)),
            Period::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
                .map(|d| d.and_time(NaiveTime::MIN)),
        };
        start.unwrap_or(at)
    }

    fn index(&self) -> usize {
        match self {
            Period::Minute => 0,
            Period::Hour => 1,
            Period::Day => 2,
            Period::Month => 3,
        }
    }
}

impl core::fmt::Display for Period {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Period::Minute => "minute",
            Period::Hour => "hour",
            Period::Day => "day",
            Period::Month => "month",
        };
        f.write_str(name)
    }
}

/// Cost estimate for one bucket, open or closed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    pub period: Period,
    pub start: NaiveDateTime,
    pub samples: u64,
    /// Watts
    pub mean_power: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    start: NaiveDateTime,
    power_sum: f64,
    samples: u64,
}

impl Bucket {
    fn new(start: NaiveDateTime) -> Self {
        Self {
            start,
            power_sum: 0.0,
            samples: 0,
        }
    }

    fn estimate(&self, period: Period, tariff_per_kwh: f64) -> CostEstimate {
        let mean_power = if self.samples == 0 {
            0.0
        } else {
            self.power_sum / self.samples as f64
        };
        CostEstimate {
            period,
            start: self.start,
            samples: self.samples,
            mean_power,
            cost: mean_power / 1000.0 * period.hours() * tariff_per_kwh,
        }
    }
}

/// Running electricity cost per [`Period`]. Each period keeps a single open
/// bucket; a sample landing past it closes the bucket and starts a new one.
/// The cost of a bucket assumes the mean of its power samples was drawn for
/// the whole period
pub struct CostAggregator {
    tariff_per_kwh: f64,
    buckets: [Option<Bucket>; 4],
}

impl CostAggregator {
    pub fn new(tariff_per_kwh: f64) -> Self {
        Self {
            tariff_per_kwh,
            buckets: [None; 4],
        }
    }

    pub fn tariff_per_kwh(&self) -> f64 {
        self.tariff_per_kwh
    }

    /// Add one power sample taken at `at`. Returns the buckets it closed,
    /// shortest period first. Samples older than an open bucket are counted
    /// in it rather than reopening history
    pub fn record(&mut self, at: NaiveDateTime, power: f32) -> Vec<CostEstimate> {
        if !power.is_finite() {
            log::debug!("Skipping undefined power sample");
            return vec![];
        }

        let mut closed = vec![];
        for period in Period::ALL {
            let start = period.bucket_start(at);
            let slot = &mut self.buckets[period.index()];

            if let Some(open) = *slot {
                if start > open.start {
                    closed.push(open.estimate(period, self.tariff_per_kwh));
                    *slot = None;
                }
            }

            let bucket = slot.get_or_insert_with(|| Bucket::new(start));
            bucket.power_sum += power as f64;
            bucket.samples += 1;
        }
        closed
    }

    pub fn current(&self, period: Period) -> Option<CostEstimate> {
        self.buckets[period.index()].map(|b| b.estimate(period, self.tariff_per_kwh))
    }
}
