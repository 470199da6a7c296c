//! Telemetry payload published by the node on the telemetry topic.
//!
//! The payload is a JSON object with exactly six numeric fields in the
//! fixed key order `voltage, current, power, energy, frequency, pf`.
//! Every number is rendered with two decimal digits, e.g.
//!
//! ```text
//! {"voltage":230.10,"current":2.50,"power":575.25,"energy":1024.30,"frequency":50.00,"pf":0.98}
//! ```
//!
//! An undefined (NaN or infinite) energy reading, which the validity gate
//! lets through, is sent as `null`.

use serde::{ser::Error as _, Deserialize, Serialize, Serializer};
use serde_json::value::RawValue;
use thiserror::Error;

use crate::{MetricSample, SampleError};

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Serde error {0}")]
    Json(#[from] serde_json::Error),
    #[error("Refusing to encode sample: {0}")]
    InvalidSample(#[from] SampleError),
}

/// Number rendered with exactly two fractional digits
struct Fixed(f32);

impl Serialize for Fixed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let raw = RawValue::from_string(format!("{:.2}", self.0)).map_err(S::Error::custom)?;
        raw.serialize(serializer)
    }
}

// Field order here is the wire order
#[derive(Serialize)]
struct Outgoing {
    voltage: Fixed,
    current: Fixed,
    power: Fixed,
    energy: Option<Fixed>,
    frequency: Fixed,
    pf: Fixed,
}

#[derive(Deserialize)]
struct Incoming {
    voltage: f32,
    current: f32,
    power: f32,
    energy: Option<f32>,
    frequency: f32,
    pf: f32,
}

/// Serialize a sample into the telemetry payload. The caller is expected to
/// have validated the sample, an invalid one is rejected rather than encoded
pub fn encode(sample: &MetricSample) -> Result<Vec<u8>, CodecError> {
    sample.validate()?;

    let payload = Outgoing {
        voltage: Fixed(sample.voltage),
        current: Fixed(sample.current),
        power: Fixed(sample.power),
        energy: sample.energy.is_finite().then_some(Fixed(sample.energy)),
        frequency: Fixed(sample.frequency),
        pf: Fixed(sample.power_factor),
    };

    Ok(serde_json::to_vec(&payload)?)
}

pub fn decode(payload: &[u8]) -> Result<MetricSample, CodecError> {
    let wire: Incoming = serde_json::from_slice(payload)?;
    Ok(MetricSample {
        voltage: wire.voltage,
        current: wire.current,
        power: wire.power,
        energy: wire.energy.unwrap_or(f32::NAN),
        frequency: wire.frequency,
        power_factor: wire.pf,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Metric;

    #[test]
    fn check_reference_payload() {
        let sample = MetricSample::new(230.1, 2.5, 575.25, 1024.3, 0.98);
        let payload = encode(&sample).unwrap();
        assert_eq!(
            std::str::from_utf8(&payload).unwrap(),
            r#"{"voltage":230.10,"current":2.50,"power":575.25,"energy":1024.30,"frequency":50.00,"pf":0.98}"#
        );
    }

    #[test]
    fn decode_recovers_encoded_fields() {
        let samples = [
            MetricSample::new(230.1, 2.5, 575.25, 1024.3, 0.98),
            MetricSample::new(0.0, 0.0, 0.0, 0.0, 0.0),
            MetricSample::new(249.9, 99.999, 22_999.9, 9_999_999.0, 1.0),
        ];

        for sample in samples {
            let decoded = decode(&encode(&sample).unwrap()).unwrap();
            let pairs = [
                (sample.voltage, decoded.voltage),
                (sample.current, decoded.current),
                (sample.power, decoded.power),
                (sample.energy, decoded.energy),
                (sample.frequency, decoded.frequency),
                (sample.power_factor, decoded.power_factor),
            ];
            for (before, after) in pairs {
                assert!(
                    (before - after).abs() <= 0.005 + before.abs() * f32::EPSILON,
                    "{before} decoded as {after}"
                );
            }
        }
    }

    #[test]
    fn keys_keep_wire_order() {
        let payload = encode(&MetricSample::new(1.0, 2.0, 3.0, 4.0, 0.5)).unwrap();
        let text = String::from_utf8(payload).unwrap();
        let positions: Vec<usize> = ["\"voltage\"", "\"current\"", "\"power\"", "\"energy\"", "\"frequency\"", "\"pf\""]
            .iter()
            .map(|key| text.find(key).expect("key present"))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn undefined_energy_is_null() {
        let sample = MetricSample::new(230.1, 2.5, 575.25, f32::NAN, 0.98);
        let payload = encode(&sample).unwrap();
        let text = std::str::from_utf8(&payload).unwrap();
        assert!(text.contains(r#""energy":null"#));
        assert!(decode(&payload).unwrap().energy.is_nan());
    }

    #[test]
    fn invalid_sample_is_not_encoded() {
        let sample = MetricSample::new(230.1, f32::NAN, 575.25, 1024.3, 0.98);
        assert!(matches!(
            encode(&sample),
            Err(CodecError::InvalidSample(SampleError::Undefined(Metric::Current)))
        ));
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(matches!(decode(b"ON"), Err(CodecError::Json(_))));
    }

    #[test]
    fn infinite_reading_is_invalid_not_a_json_error() {
        let sample = MetricSample::new(230.1, 2.5, f32::INFINITY, 1024.3, 0.98);
        assert!(matches!(
            encode(&sample),
            Err(CodecError::InvalidSample(SampleError::Undefined(Metric::Power)))
        ));

        let sample = MetricSample::new(230.1, 2.5, 575.25, f32::NEG_INFINITY, 0.98);
        let payload = encode(&sample).unwrap();
        assert!(std::str::from_utf8(&payload).unwrap().contains(r#""energy":null"#));
    }
}
