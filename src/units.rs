//! Optical unit conversions.

/// Speed of light in vacuum, m/s
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Wavelength in nm to optical frequency in GHz
pub fn wavelength_to_frequency(wavelength_nm: f64) -> f64 {
    SPEED_OF_LIGHT / wavelength_nm
}

/// Optical frequency in GHz to wavelength in nm
pub fn frequency_to_wavelength(frequency_ghz: f64) -> f64 {
    SPEED_OF_LIGHT / frequency_ghz
}

/// Round to a fixed number of decimals
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
