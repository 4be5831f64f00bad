//! GPS extraction from the EXIF block embedded in an uploaded photo.
//!
//! Decoding never fails loudly: a photo without EXIF, without a GPS directory
//! or with garbage in it simply has no coordinates.

use super::Coordinates;
use exif::{Exif, In, Reader, Tag, Value};
use std::io::Cursor;
use tracing::debug;

/// Extract signed decimal coordinates from an in-memory image.
///
/// Returns `None` when the image carries no usable GPS position. A missing
/// hemisphere reference is read as north/east.
pub fn decode_coordinates(image: &[u8]) -> Option<Coordinates> {
    let exif = match Reader::new().read_from_container(&mut Cursor::new(image)) {
        Ok(exif) => exif,
        Err(e) => {
            debug!(error = %e, "No readable EXIF block");
            return None;
        }
    };

    let latitude = signed_degrees(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, b'S')?;
    let longitude = signed_degrees(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, b'W')?;

    if latitude.abs() > 90.0 || longitude.abs() > 180.0 {
        debug!(latitude, longitude, "GPS position out of range");
        return None;
    }

    Some(Coordinates::new(latitude, longitude))
}

fn signed_degrees(exif: &Exif, value_tag: Tag, ref_tag: Tag, negative_ref: u8) -> Option<f64> {
    let field = match exif.get_field(value_tag, In::PRIMARY) {
        Some(field) => field,
        None => {
            debug!(tag = %value_tag, "GPS field missing");
            return None;
        }
    };

    let degrees = match &field.value {
        Value::Rational(parts) if parts.len() >= 3 => {
            dms_to_decimal(parts[0].to_f64(), parts[1].to_f64(), parts[2].to_f64())
        }
        other => {
            debug!(tag = %value_tag, value = ?other, "GPS field is not a degrees/minutes/seconds triple");
            return None;
        }
    };

    if !degrees.is_finite() {
        debug!(tag = %value_tag, "GPS field has a zero denominator");
        return None;
    }

    match hemisphere(exif, ref_tag) {
        Some(reference) if reference.eq_ignore_ascii_case(&negative_ref) => Some(-degrees),
        Some(_) => Some(degrees),
        None => {
            debug!(tag = %ref_tag, "Hemisphere reference missing, assuming north/east");
            Some(degrees)
        }
    }
}

fn hemisphere(exif: &Exif, ref_tag: Tag) -> Option<u8> {
    match &exif.get_field(ref_tag, In::PRIMARY)?.value {
        Value::Ascii(strings) => strings.first().and_then(|s| s.first()).copied(),
        _ => None,
    }
}

pub fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    degrees + minutes / 60.0 + seconds / 3600.0
}
