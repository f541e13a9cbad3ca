//! # CRC8 Engine
//!
//! Table-driven and bitwise CRC-8 (MSB first) for arbitrary polynomials,
//! plus the 4-bit PROM check used by the MS5611 barometer.
//!
//! **SHT41 parameters**: polynomial 0x31 (x^8 + x^5 + x^4 + 1), initial value 0xFF

/// SHT4x CRC polynomial
pub const SHT41_CRC_POLY: u8 = 0x31;

/// SHT4x CRC initial value
pub const SHT41_CRC_INIT: u8 = 0xFF;

/// Precomputed table for the SHT4x polynomial
pub static SHT41_CRC_TABLE: Crc8LookupTable = Crc8LookupTable::new(SHT41_CRC_POLY);

/// 256-entry CRC-8 lookup table for one polynomial
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crc8LookupTable {
    polynomial: u8,
    table: [u8; 256],
}

impl Crc8LookupTable {
    /// Generate the lookup table for `polynomial` at compile time
    ///
    /// # Examples
    ///
    /// ```
    /// use fetcher::crc::{calculate_crc8, Crc8LookupTable};
    ///
    /// const TABLE: Crc8LookupTable = Crc8LookupTable::new(0x31);
    /// assert_eq!(calculate_crc8(&[0xBE, 0xEF], &TABLE, 0xFF), 0x92);
    /// ```
    pub const fn new(polynomial: u8) -> Self {
        let mut table = [0u8; 256];
        let mut i = 0;

        while i < 256 {
            let mut crc = i as u8;
            let mut j = 0;

            while j < 8 {
                if (crc & 0x80) != 0 {
                    crc = (crc << 1) ^ polynomial;
                } else {
                    crc <<= 1;
                }
                j += 1;
            }

            table[i] = crc;
            i += 1;
        }

        Self { polynomial, table }
    }

    /// Polynomial this table was generated for
    pub const fn polynomial(&self) -> u8 {
        self.polynomial
    }

    /// Table entry for `index`
    pub const fn entry(&self, index: u8) -> u8 {
        self.table[index as usize]
    }
}

/// Calculate CRC-8 using a lookup table (fast)
///
/// # Arguments
///
/// * `buf` - Bytes to checksum
/// * `lookup` - Table generated for the desired polynomial
/// * `initial` - Initial register value
///
/// # Returns
///
/// * `u8` - Calculated CRC8 checksum
pub fn calculate_crc8(buf: &[u8], lookup: &Crc8LookupTable, initial: u8) -> u8 {
    let mut crc = initial;

    for &byte in buf {
        crc = lookup.table[(crc ^ byte) as usize];
    }

    crc
}

/// Calculate CRC-8 bit by bit (slow, no table needed)
///
/// Produces the same result as [`calculate_crc8`] for the same polynomial
/// and initial value.
pub fn calculate_crc8_bitwise(buf: &[u8], polynomial: u8, initial: u8) -> u8 {
    let mut crc = initial;

    for &byte in buf {
        crc ^= byte;

        for _ in 0..8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ polynomial;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}

/// CRC-4 over the eight MS5611 PROM words (AN520)
///
/// The CRC itself lives in the low nibble of word 7 and is excluded from
/// the calculation.
pub fn crc4_ms5611(prom: &[u16; 8]) -> u8 {
    let mut words = *prom;
    words[7] &= 0xFF00;

    let mut rem: u16 = 0;
    for cnt in 0..16 {
        let word = words[cnt >> 1];
        if cnt % 2 == 1 {
            rem ^= word & 0x00FF;
        } else {
            rem ^= word >> 8;
        }

        for _ in 0..8 {
            if (rem & 0x8000) != 0 {
                rem = (rem << 1) ^ 0x3000;
            } else {
                rem <<= 1;
            }
        }
    }

    ((rem >> 12) & 0x000F) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc8_empty_returns_initial() {
        assert_eq!(calculate_crc8(&[], &SHT41_CRC_TABLE, SHT41_CRC_INIT), 0xFF);
        assert_eq!(calculate_crc8_bitwise(&[], SHT41_CRC_POLY, 0x5A), 0x5A);
    }

    #[test]
    fn test_crc8_sht41_known_vector() {
        // Datasheet example: 0xBEEF -> 0x92
        let data = [0xBE, 0xEF];
        assert_eq!(calculate_crc8(&data, &SHT41_CRC_TABLE, SHT41_CRC_INIT), 0x92);
        assert_eq!(calculate_crc8_bitwise(&data, SHT41_CRC_POLY, SHT41_CRC_INIT), 0x92);
    }

    #[test]
    fn test_crc8_table_fully_populated() {
        // Every entry, including index 0xFF, must equal a one-byte bitwise CRC
        for poly in [0x07u8, 0x31, 0xD5] {
            let table = Crc8LookupTable::new(poly);
            for i in 0..=255u8 {
                assert_eq!(
                    table.entry(i),
                    calculate_crc8_bitwise(&[i], poly, 0x00),
                    "poly 0x{:02X} entry {}",
                    poly,
                    i
                );
            }
        }
    }

    #[test]
    fn test_crc8_lookup_matches_bitwise() {
        let test_data = [
            vec![0x01, 0x02, 0x03],
            vec![0xFF, 0xFE, 0xFD],
            vec![0x66, 0x7A, 0x00, 0x12, 0x34],
            vec![0x00; 24],
            vec![0xFF; 10],
        ];

        for poly in [0x07u8, 0x31, 0xD5] {
            let table = Crc8LookupTable::new(poly);
            for initial in [0x00u8, 0xFF, 0xA5] {
                for data in test_data.iter() {
                    assert_eq!(
                        calculate_crc8(data, &table, initial),
                        calculate_crc8_bitwise(data, poly, initial),
                        "CRC mismatch for data: {:?}",
                        data
                    );
                }
            }
        }
    }

    #[test]
    fn test_crc8_changes_with_data() {
        let crc1 = calculate_crc8(&[0x66, 0x7A], &SHT41_CRC_TABLE, SHT41_CRC_INIT);
        let crc2 = calculate_crc8(&[0x66, 0x7B], &SHT41_CRC_TABLE, SHT41_CRC_INIT);
        assert_ne!(crc1, crc2);
    }

    #[test]
    fn test_crc4_ignores_own_nibble() {
        let mut prom = [0x0000, 40127, 36924, 23317, 23282, 33464, 28312, 0x0A00];
        let crc = crc4_ms5611(&prom);
        prom[7] |= crc as u16;
        assert_eq!(crc4_ms5611(&prom), crc);
    }

    #[test]
    fn test_crc4_detects_coefficient_change() {
        let prom = [0x0000, 40127, 36924, 23317, 23282, 33464, 28312, 0x0A00];
        let crc = crc4_ms5611(&prom);

        let mut corrupted = prom;
        corrupted[3] ^= 0x0100;
        assert_ne!(crc4_ms5611(&corrupted), crc);
    }
}
