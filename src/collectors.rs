//! # Collector Registry
//!
//! Static table mapping sensor names to driver constructors.
//!
//! Names are matched ignoring ASCII case (`ms5611` finds `MS5611`). The
//! table is fixed at build time; adding a driver means adding a row here.

use crate::error::{FetcherError, Result};
use crate::sensor::lsm6dso32::{Lsm6dso32, LSM6DSO32_NAME};
use crate::sensor::m10spg::{M10spg, M10SPG_NAME};
use crate::sensor::ms5611::{Ms5611, MS5611_NAME};
use crate::sensor::pac195x::{Pac195x, PAC195X_NAME};
use crate::sensor::sht41::{Sht41, SHT41_NAME};
use crate::sensor::sysclock::{Sysclock, SYSCLOCK_NAME};
use crate::sensor::Collector;

/// One registry row
#[derive(Debug, Clone, Copy)]
pub struct CollectorEntry {
    pub sensor_name: &'static str,
    pub collector: Collector,
}

static COLLECTORS: &[CollectorEntry] = &[
    CollectorEntry {
        sensor_name: SHT41_NAME,
        collector: Sht41::collector,
    },
    CollectorEntry {
        sensor_name: SYSCLOCK_NAME,
        collector: Sysclock::collector,
    },
    CollectorEntry {
        sensor_name: MS5611_NAME,
        collector: Ms5611::collector,
    },
    CollectorEntry {
        sensor_name: LSM6DSO32_NAME,
        collector: Lsm6dso32::collector,
    },
    CollectorEntry {
        sensor_name: M10SPG_NAME,
        collector: M10spg::collector,
    },
    CollectorEntry {
        sensor_name: PAC195X_NAME,
        collector: Pac195x::collector,
    },
];

/// Look up the collector registered under `name`
///
/// # Errors
///
/// Returns `UnknownSensorName` if no entry matches
///
/// # Examples
///
/// ```
/// use fetcher::collectors::collector_search;
///
/// let entry = collector_search("ms5611").unwrap();
/// assert_eq!(entry.sensor_name, "MS5611");
/// assert!(collector_search("not-a-real-sensor").is_err());
/// ```
pub fn collector_search(name: &str) -> Result<&'static CollectorEntry> {
    COLLECTORS
        .iter()
        .find(|entry| entry.sensor_name.eq_ignore_ascii_case(name))
        .ok_or_else(|| FetcherError::UnknownSensorName(name.to_string()))
}

/// Registered names, in table order
pub fn names() -> impl Iterator<Item = &'static str> {
    COLLECTORS.iter().map(|entry| entry.sensor_name)
}

/// True if no two rows share a name (ignoring case)
pub fn check_unique_names() -> bool {
    COLLECTORS.iter().enumerate().all(|(i, entry)| {
        COLLECTORS[i + 1..]
            .iter()
            .all(|other| !other.sensor_name.eq_ignore_ascii_case(entry.sensor_name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{SensorLocation, SensorPrecision};

    #[test]
    fn test_every_driver_registered() {
        let all: Vec<_> = names().collect();
        assert_eq!(all, vec!["SHT41", "SYSCLOCK", "MS5611", "LSM6DSO32", "M10SPG", "PAC1952"]);
    }

    #[test]
    fn test_names_are_unique() {
        assert!(check_unique_names());
    }

    #[test]
    fn test_search_builds_matching_driver() {
        for name in names() {
            let entry = collector_search(name).unwrap();
            let sensor = (entry.collector)(SensorLocation::new(0x10), SensorPrecision::High);
            assert_eq!(sensor.name(), name);
            assert!(!sensor.is_open());
        }
    }

    #[test]
    fn test_search_miss() {
        match collector_search("BMP390") {
            Err(FetcherError::UnknownSensorName(name)) => assert_eq!(name, "BMP390"),
            other => panic!("Expected UnknownSensorName, got {:?}", other.map(|e| e.sensor_name)),
        }
    }

    #[test]
    fn test_search_ignores_case() {
        let entry = collector_search("ms5611").unwrap();
        assert_eq!(entry.sensor_name, "MS5611");

        let sensor = (entry.collector)(SensorLocation::new(0x77), SensorPrecision::High);
        assert_eq!(sensor.name(), "MS5611");

        assert_eq!(collector_search("Sht41").unwrap().sensor_name, "SHT41");
        assert!(collector_search("SHT41 ").is_err());
    }

    #[test]
    fn test_search_is_deterministic() {
        let first = collector_search("ms5611").unwrap();
        for _ in 0..10 {
            let again = collector_search("ms5611").unwrap();
            assert!(std::ptr::eq(first, again));
        }
        assert!(std::ptr::eq(first, collector_search("MS5611").unwrap()));
        assert!(collector_search("not-a-real-sensor").is_err());
    }
}
