//! Sunrise and sunset.
//!
//! Uses the NOAA / Almanac for Computers approximation with the standard
//! refraction-corrected zenith of 90.833°. Good to a few minutes, which is
//! plenty for deciding when to point a camera at the sky.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

const ZENITH: f64 = 90.833;

/// Observer position in decimal degrees (north and east positive).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SunTimes {
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
}

/// Sunrise and sunset for a calendar date at a location.
///
/// Returns `None` when the sun does not cross the horizon that day
/// (polar day or polar night).
pub fn sun_times(date: NaiveDate, latitude: f64, longitude: f64) -> Option<SunTimes> {
    Some(SunTimes {
        sunrise: event(date, latitude, longitude, true)?,
        sunset: event(date, latitude, longitude, false)?,
    })
}

fn normalize(value: f64, range: f64) -> f64 {
    value.rem_euclid(range)
}

fn event(date: NaiveDate, latitude: f64, longitude: f64, rising: bool) -> Option<DateTime<Utc>> {
    use chrono::Datelike;

    let day_of_year = f64::from(date.ordinal());
    let lng_hour = longitude / 15.0;
    let approx_local = if rising { 6.0 } else { 18.0 };
    let t = day_of_year + (approx_local - lng_hour) / 24.0;

    // Sun's mean anomaly and true longitude
    let m = 0.9856 * t - 3.289;
    let l = normalize(
        m + 1.916 * m.to_radians().sin() + 0.020 * (2.0 * m).to_radians().sin() + 282.634,
        360.0,
    );

    // Right ascension, moved into the same quadrant as L
    let mut ra = normalize((0.91764 * l.to_radians().tan()).atan().to_degrees(), 360.0);
    ra += (l / 90.0).floor() * 90.0 - (ra / 90.0).floor() * 90.0;
    ra /= 15.0;

    let sin_dec = 0.39782 * l.to_radians().sin();
    let cos_dec = sin_dec.asin().cos();

    let cos_h = (ZENITH.to_radians().cos() - sin_dec * latitude.to_radians().sin())
        / (cos_dec * latitude.to_radians().cos());
    if !(-1.0..=1.0).contains(&cos_h) {
        return None;
    }

    let hour_angle = if rising {
        360.0 - cos_h.acos().to_degrees()
    } else {
        cos_h.acos().to_degrees()
    };
    let h = hour_angle / 15.0;

    let local_mean = h + ra - 0.06571 * t - 6.622;
    let mut ut = normalize(local_mean - lng_hour, 24.0);

    // Keep the event on the UTC day nearest its rough estimate, so far-east
    // sunrises land on the previous UTC day instead of a day late
    let estimate = approx_local - lng_hour;
    while ut - estimate > 12.0 {
        ut -= 24.0;
    }
    while estimate - ut > 12.0 {
        ut += 24.0;
    }

    let midnight = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?);
    Some(midnight + Duration::milliseconds((ut * 3_600_000.0).round() as i64))
}

/// The calendar date `now` falls on in `tz`.
pub fn local_date<Tz: TimeZone>(now: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    now.with_timezone(tz).date_naive()
}

/// When to start and stop shooting on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureWindow {
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
}

impl CaptureWindow {
    /// Sunrise minus `frame_margin * every` seconds to sunset plus the same.
    pub fn for_date(
        date: NaiveDate,
        location: Location,
        every: u64,
        frame_margin: u32,
    ) -> Option<Self> {
        let sun = sun_times(date, location.latitude, location.longitude)?;
        let margin_secs = i64::from(frame_margin).saturating_mul(i64::try_from(every).ok()?);
        let margin = Duration::try_seconds(margin_secs)?;
        Some(Self {
            sunrise: sun.sunrise,
            sunset: sun.sunset,
            start: sun.sunrise - margin,
            stop: sun.sunset + margin,
        })
    }
}
