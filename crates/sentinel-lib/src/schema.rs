//! Static measurement registry
//!
//! Maps each measurement name to the fields a row must carry and to the
//! channels those fields are shaped into. The registry is built once and
//! never re-derived per request.

use std::collections::{BTreeMap, HashMap};

use crate::error::{DetectorError, DetectorResult};

/// Ratio channels are expressed in percent
pub const RATIO_SCALE: f64 = 100.0;

const CAPACITY_FIELDS: &[&str] = &["total", "free", "used"];
const CAPACITY_CHANNELS: &[&str] = &["used_ratio", "free_ratio"];

const WAIT_EVENT_FIELDS: &[&str] = &["lock", "lwlock", "io", "client", "ipc", "timeout"];

/// How the fields of a row become channel values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shaping {
    /// `used / total` and `free / total`, scaled to percent
    CapacityRatios,
    /// Every field is its own channel
    Identity,
}

/// Declared layout of one measurement
#[derive(Debug, Clone)]
pub struct MeasurementSchema {
    pub name: &'static str,
    pub fields: &'static [&'static str],
    pub shaping: Shaping,
}

impl MeasurementSchema {
    /// Channel names produced by [`MeasurementSchema::shape`], in order
    pub fn channels(&self) -> &'static [&'static str] {
        match self.shaping {
            Shaping::CapacityRatios => CAPACITY_CHANNELS,
            Shaping::Identity => self.fields,
        }
    }

    /// Turn a raw row into channel values.
    ///
    /// Fails with `InvalidArgument` when a declared field is missing. A zero
    /// `total` produces a non-finite ratio that the channel buffer rejects.
    pub fn shape(&self, fields: &HashMap<String, f64>) -> DetectorResult<BTreeMap<String, f64>> {
        let field = |name: &str| -> DetectorResult<f64> {
            fields.get(name).copied().ok_or_else(|| {
                DetectorError::invalid(format!(
                    "measurement '{}' is missing field '{}'",
                    self.name, name
                ))
            })
        };

        let mut shaped = BTreeMap::new();
        match self.shaping {
            Shaping::CapacityRatios => {
                let total = field("total")?;
                let free = field("free")?;
                let used = field("used")?;
                shaped.insert("used_ratio".to_string(), RATIO_SCALE * used / total);
                shaped.insert("free_ratio".to_string(), RATIO_SCALE * free / total);
            }
            Shaping::Identity => {
                for name in self.fields {
                    shaped.insert(name.to_string(), field(name)?);
                }
            }
        }
        Ok(shaped)
    }
}

/// Registry of known measurements
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    measurements: HashMap<&'static str, MeasurementSchema>,
}

impl SchemaRegistry {
    pub fn empty() -> Self {
        Self {
            measurements: HashMap::new(),
        }
    }

    pub fn register(&mut self, schema: MeasurementSchema) {
        self.measurements.insert(schema.name, schema);
    }

    pub fn get(&self, measurement: &str) -> DetectorResult<&MeasurementSchema> {
        self.measurements
            .get(measurement)
            .ok_or_else(|| DetectorError::invalid(format!("unknown measurement '{}'", measurement)))
    }

    pub fn measurements(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.measurements.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Shape a row of `measurement` into channel values
    pub fn shape(
        &self,
        measurement: &str,
        fields: &HashMap<String, f64>,
    ) -> DetectorResult<BTreeMap<String, f64>> {
        self.get(measurement)?.shape(fields)
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for name in ["cpu", "ram", "disk"] {
            registry.register(MeasurementSchema {
                name,
                fields: CAPACITY_FIELDS,
                shaping: Shaping::CapacityRatios,
            });
        }
        registry.register(MeasurementSchema {
            name: "pg_wait_events",
            fields: WAIT_EVENT_FIELDS,
            shaping: Shaping::Identity,
        });
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_default_measurements() {
        let registry = SchemaRegistry::default();
        assert_eq!(registry.measurements(), vec!["cpu", "disk", "pg_wait_events", "ram"]);
        assert_eq!(registry.get("ram").unwrap().channels(), &["used_ratio", "free_ratio"]);
    }

    #[test]
    fn test_capacity_ratios() {
        let registry = SchemaRegistry::default();
        let shaped = registry
            .shape("cpu", &row(&[("total", 200.0), ("free", 50.0), ("used", 150.0)]))
            .unwrap();
        assert_eq!(shaped["used_ratio"], 75.0);
        assert_eq!(shaped["free_ratio"], 25.0);
    }

    #[test]
    fn test_wait_events_are_identity() {
        let registry = SchemaRegistry::default();
        let fields = row(&[
            ("lock", 1.0),
            ("lwlock", 2.0),
            ("io", 3.0),
            ("client", 4.0),
            ("ipc", 5.0),
            ("timeout", 6.0),
        ]);
        let shaped = registry.shape("pg_wait_events", &fields).unwrap();
        assert_eq!(shaped.len(), 6);
        assert_eq!(shaped["ipc"], 5.0);
    }

    #[test]
    fn test_missing_field_and_unknown_measurement() {
        let registry = SchemaRegistry::default();
        let err = registry
            .shape("disk", &row(&[("total", 1.0), ("free", 0.5)]))
            .unwrap_err();
        assert!(err.to_string().contains("used"));

        assert!(matches!(
            registry.shape("gpu", &HashMap::new()),
            Err(DetectorError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_zero_total_yields_non_finite_ratio() {
        let shaped = SchemaRegistry::default()
            .shape("ram", &row(&[("total", 0.0), ("free", 0.0), ("used", 1.0)]))
            .unwrap();
        assert!(!shaped["used_ratio"].is_finite());
    }
}
