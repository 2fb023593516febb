//! GPS bowls: photos are sorted by where they were taken.
//!
//! A `[BOWLS_GPS]` entry names a bowl, optionally with its own radius after a
//! semicolon, and lists reference points separated by semicolons:
//!
//! ```ini
//! [BOWLS_GPS]
//! Photos/Home = 52.1159,11.6037
//! Photos/Harz;5 = 51.80,10.61; 51.75,10.55
//! Photos/Elsewhere = !DEFAULT
//! ```
//!
//! An image belongs to the first bowl with a point closer than the radius.

use crate::bowls::{DEFAULT_MARKER, bowl_name};
use exif::{In, Tag, Value};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Mean earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Radius used when neither the bowl nor `[ITEMS]` sets one.
pub const DEFAULT_DISTANCE_KM: f64 = 2.0;

#[derive(Debug, Error)]
pub enum GpsError {
    #[error("'{0}' is not a valid 'latitude,longitude' pair")]
    InvalidCoordinate(String),
    #[error("invalid radius '{radius}' in GPS bowl '{bowl}'")]
    InvalidRadius { bowl: String, radius: String },
    #[error("cannot open image {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    /// Creates a coordinate, rejecting values outside the valid ranges.
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon);
        valid.then_some(Self { lat, lon })
    }

    /// Great-circle distance to `other` in kilometres.
    pub fn distance_km(&self, other: &Coordinate) -> f64 {
        haversine_km(*self, *other)
    }

    /// `0,0` is what many cameras write when they had no fix.
    pub fn is_null_island(&self) -> bool {
        self.lat == 0.0 && self.lon == 0.0
    }
}

impl FromStr for Coordinate {
    type Err = GpsError;

    /// Parses `"lat,lon"`; whitespace anywhere is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let invalid = || GpsError::InvalidCoordinate(s.trim().to_string());

        let (lat, lon) = compact.split_once(',').ok_or_else(invalid)?;
        let lat: f64 = lat.parse().map_err(|_| invalid())?;
        let lon: f64 = lon.parse().map_err(|_| invalid())?;
        Coordinate::new(lat, lon).ok_or_else(invalid)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lon)
    }
}

/// Haversine distance between two coordinates in kilometres.
///
/// ```
/// use bowlsort::gps::{haversine_km, Coordinate};
///
/// let berlin = Coordinate::new(52.5200, 13.4050).unwrap();
/// let paris = Coordinate::new(48.8566, 2.3522).unwrap();
/// assert!((haversine_km(berlin, paris) - 878.0).abs() < 5.0);
/// ```
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Parses a decimal that may use a comma as separator (`2,5`).
pub fn parse_decimal(text: &str) -> Option<f64> {
    text.trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// A GPS destination.
#[derive(Debug, Clone, PartialEq)]
pub struct GpsBowl {
    pub name: String,
    /// Radius set in the key (`Name;3`); `None` falls back to the table default.
    pub radius_km: Option<f64>,
    pub points: Vec<Coordinate>,
    pub is_default: bool,
}

impl GpsBowl {
    /// Parses an INI key (`Name` or `Name;radius`) and its point list.
    ///
    /// Points that do not parse are skipped and reported in `warnings`.
    ///
    /// # Errors
    ///
    /// Returns [`GpsError::InvalidRadius`] when the key suffix is not a
    /// non-negative number.
    pub fn parse(key: &str, criteria: &str, warnings: &mut Vec<String>) -> Result<Self, GpsError> {
        let (name, radius_km) = match key.rsplit_once(';') {
            Some((name, radius)) => {
                let value = parse_decimal(radius)
                    .filter(|v| *v >= 0.0)
                    .ok_or_else(|| GpsError::InvalidRadius {
                        bowl: name.trim().to_string(),
                        radius: radius.trim().to_string(),
                    })?;
                (name, Some(value))
            }
            None => (key, None),
        };
        let name = bowl_name(name, warnings);
        let is_default = criteria.contains(DEFAULT_MARKER);

        let mut points = Vec::new();
        if !is_default {
            for raw in criteria.split([';', '\n']).filter(|c| !c.trim().is_empty()) {
                match raw.parse::<Coordinate>() {
                    Ok(point) => points.push(point),
                    Err(e) => warnings.push(format!("GPS bowl '{}': {}", name, e)),
                }
            }
        }

        Ok(Self {
            name,
            radius_km,
            points,
            is_default,
        })
    }

    /// Effective radius given the table-wide default.
    pub fn radius_or(&self, default_km: f64) -> f64 {
        self.radius_km.unwrap_or(default_km)
    }

    /// Returns true if `position` lies strictly inside the radius of any point.
    pub fn contains(&self, position: Coordinate, default_km: f64) -> bool {
        if self.is_default {
            return false;
        }
        let radius = self.radius_or(default_km);
        self.points.iter().any(|p| {
            let distance = haversine_km(position, *p);
            debug!(bowl = %self.name, point = %p, distance, radius, "GPS distance check");
            distance < radius
        })
    }
}

/// The ordered bowls of `[BOWLS_GPS]`.
#[derive(Debug, Clone, PartialEq)]
pub struct GpsBowlTable {
    bowls: Vec<GpsBowl>,
    default_distance_km: f64,
}

impl Default for GpsBowlTable {
    fn default() -> Self {
        Self {
            bowls: Vec::new(),
            default_distance_km: DEFAULT_DISTANCE_KM,
        }
    }
}

impl GpsBowlTable {
    /// Builds a table from `(key, point list)` pairs in file order.
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = (&'a str, &'a str)>,
        default_distance_km: f64,
        warnings: &mut Vec<String>,
    ) -> Result<Self, GpsError> {
        let bowls = entries
            .into_iter()
            .map(|(key, criteria)| GpsBowl::parse(key, criteria, warnings))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            bowls,
            default_distance_km,
        })
    }

    /// Finds the bowl for an image position.
    ///
    /// First non-default bowl within range wins, then the default bowl. An
    /// image without a position resolves to nothing.
    pub fn resolve(&self, position: Option<Coordinate>) -> Option<&GpsBowl> {
        let position = position?;
        self.bowls
            .iter()
            .find(|bowl| bowl.contains(position, self.default_distance_km))
            .or_else(|| self.default_bowl())
    }

    pub fn default_bowl(&self) -> Option<&GpsBowl> {
        self.bowls.iter().rev().find(|bowl| bowl.is_default)
    }

    pub fn default_distance_km(&self) -> f64 {
        self.default_distance_km
    }

    pub fn iter(&self) -> impl Iterator<Item = &GpsBowl> {
        self.bowls.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.bowls.is_empty()
    }

    pub fn lint(&self) -> Vec<String> {
        let mut warnings: Vec<String> = self
            .bowls
            .iter()
            .filter(|b| !b.is_default && b.points.is_empty())
            .map(|b| format!("[BOWLS_GPS] bowl '{}' has no valid coordinates", b.name))
            .collect();
        if self.bowls.iter().filter(|b| b.is_default).count() > 1 {
            warnings.push("[BOWLS_GPS] several default bowls; the last one is used".to_string());
        }
        warnings
    }
}

/// Converts degrees/minutes/seconds plus a hemisphere reference to decimal
/// degrees. `S` and `W` are negative.
pub fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64, reference: u8) -> f64 {
    let value = degrees + minutes / 60.0 + seconds / 3600.0;
    match reference.to_ascii_uppercase() {
        b'S' | b'W' => -value,
        _ => value,
    }
}

fn rational_triplet(field: &exif::Field) -> Option<(f64, f64, f64)> {
    match field.value {
        Value::Rational(ref parts) if parts.len() >= 3 => {
            let (d, m, s) = (parts[0].to_f64(), parts[1].to_f64(), parts[2].to_f64());
            (d.is_finite() && m.is_finite() && s.is_finite()).then_some((d, m, s))
        }
        _ => None,
    }
}

fn hemisphere(exif: &exif::Exif, tag: Tag, fallback: u8) -> u8 {
    exif.get_field(tag, In::PRIMARY)
        .and_then(|field| match field.value {
            Value::Ascii(ref values) => values.first().and_then(|v| v.first().copied()),
            _ => None,
        })
        .unwrap_or(fallback)
}

fn axis(exif: &exif::Exif, value_tag: Tag, ref_tag: Tag, fallback_ref: u8) -> Option<f64> {
    let (d, m, s) = rational_triplet(exif.get_field(value_tag, In::PRIMARY)?)?;
    Some(dms_to_decimal(d, m, s, hemisphere(exif, ref_tag, fallback_ref)))
}

/// Reads the GPS position stored in an image's EXIF block.
///
/// Returns `Ok(None)` when the image has no EXIF data, no GPS tags, or the
/// `0,0` placeholder.
///
/// # Errors
///
/// Only failing to open the file is an error; a malformed EXIF block is
/// treated as "no position".
pub fn read_image_coordinates(path: &Path) -> Result<Option<Coordinate>, GpsError> {
    let file = File::open(path).map_err(|e| GpsError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut reader = BufReader::new(file);

    let exif = match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => exif,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no readable EXIF data");
            return Ok(None);
        }
    };

    let lat = axis(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, b'N');
    let lon = axis(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, b'E');
    let position = match (lat, lon) {
        (Some(lat), Some(lon)) => Coordinate::new(lat, lon),
        _ => None,
    };

    Ok(position.filter(|p| !p.is_null_island()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    type Dms = [(u32, u32); 3];

    /// A minimal JPEG: SOI, an APP1 Exif segment whose IFD0 points at a GPS
    /// IFD with latitude/longitude rationals and their references, then EOI.
    fn geotagged_jpeg(lat_ref: u8, lat: Dms, lon_ref: u8, lon: Dms) -> Vec<u8> {
        fn entry(tiff: &mut Vec<u8>, tag: u16, kind: u16, count: u32, value: [u8; 4]) {
            tiff.extend(tag.to_le_bytes());
            tiff.extend(kind.to_le_bytes());
            tiff.extend(count.to_le_bytes());
            tiff.extend(value);
        }
        const ASCII: u16 = 2;
        const LONG: u16 = 4;
        const RATIONAL: u16 = 5;

        let mut tiff = b"II".to_vec();
        tiff.extend(42u16.to_le_bytes());
        tiff.extend(8u32.to_le_bytes());
        // IFD0 at 8: only the GPS IFD pointer.
        tiff.extend(1u16.to_le_bytes());
        entry(&mut tiff, 0x8825, LONG, 1, 26u32.to_le_bytes());
        tiff.extend(0u32.to_le_bytes());
        // GPS IFD at 26, rationals at 80 and 104.
        tiff.extend(4u16.to_le_bytes());
        entry(&mut tiff, 0x0001, ASCII, 2, [lat_ref, 0, 0, 0]);
        entry(&mut tiff, 0x0002, RATIONAL, 3, 80u32.to_le_bytes());
        entry(&mut tiff, 0x0003, ASCII, 2, [lon_ref, 0, 0, 0]);
        entry(&mut tiff, 0x0004, RATIONAL, 3, 104u32.to_le_bytes());
        tiff.extend(0u32.to_le_bytes());
        for (num, den) in lat.iter().chain(lon.iter()) {
            tiff.extend(num.to_le_bytes());
            tiff.extend(den.to_le_bytes());
        }
        assert_eq!(tiff.len(), 128);

        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1];
        jpeg.extend(((2 + 6 + tiff.len()) as u16).to_be_bytes());
        jpeg.extend(b"Exif\0\0");
        jpeg.extend(tiff);
        jpeg.extend([0xFF, 0xD9]);
        jpeg
    }

    #[test]
    fn test_haversine_known_distances() {
        let berlin = coord(52.5200, 13.4050);
        let paris = coord(48.8566, 2.3522);
        assert!((haversine_km(berlin, paris) - 878.0).abs() < 5.0);

        let new_york = coord(40.7128, -74.0060);
        let los_angeles = coord(34.0522, -118.2437);
        assert!((haversine_km(new_york, los_angeles) - 3935.0).abs() < 10.0);

        let london = coord(51.5074, -0.1278);
        assert_eq!(haversine_km(london, london), 0.0);
    }

    #[test]
    fn test_coordinate_parsing() {
        assert_eq!("51.5, 10.25".parse::<Coordinate>().unwrap(), coord(51.5, 10.25));
        assert_eq!(" -33.9 ,18.4 ".parse::<Coordinate>().unwrap(), coord(-33.9, 18.4));
        assert!("91,0".parse::<Coordinate>().is_err());
        assert!("0,181".parse::<Coordinate>().is_err());
        assert!("51.5".parse::<Coordinate>().is_err());
        assert!("north,east".parse::<Coordinate>().is_err());
        assert!("1,2,3".parse::<Coordinate>().is_err());
    }

    #[test]
    fn test_parse_decimal_accepts_comma() {
        assert_eq!(parse_decimal("2,5"), Some(2.5));
        assert_eq!(parse_decimal(" 3 "), Some(3.0));
        assert_eq!(parse_decimal("far"), None);
        assert_eq!(parse_decimal("inf"), None);
    }

    #[test]
    fn test_bowl_key_with_radius() {
        let bowl = GpsBowl::parse("Trips/Harz;2,5", "51.8,10.6; 51.7,10.5", &mut Vec::new()).unwrap();
        assert_eq!(bowl.name, "Trips/Harz");
        assert_eq!(bowl.radius_km, Some(2.5));
        assert_eq!(bowl.points.len(), 2);
        assert!(!bowl.is_default);
    }

    #[test]
    fn test_invalid_radius_is_an_error() {
        let result = GpsBowl::parse("Harz;far", "51.8,10.6", &mut Vec::new());
        assert!(matches!(result, Err(GpsError::InvalidRadius { .. })));
        let result = GpsBowl::parse("Harz;-1", "51.8,10.6", &mut Vec::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_points_are_skipped_with_warning() {
        let mut warnings = Vec::new();
        let bowl = GpsBowl::parse("Home", "52.1,11.6; nowhere", &mut warnings).unwrap();
        assert_eq!(bowl.points.len(), 1);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_resolve_first_bowl_in_range() {
        let table = GpsBowlTable::from_entries(
            [
                ("Magdeburg;10", "52.1159,11.6037"),
                ("Saxony-Anhalt;200", "52.1159,11.6037"),
            ],
            DEFAULT_DISTANCE_KM,
            &mut Vec::new(),
        )
        .unwrap();

        let near = coord(52.13, 11.62);
        assert_eq!(table.resolve(Some(near)).unwrap().name, "Magdeburg");

        let halle = coord(51.4825, 11.9697);
        assert_eq!(table.resolve(Some(halle)).unwrap().name, "Saxony-Anhalt");

        let munich = coord(48.1351, 11.5820);
        assert!(table.resolve(Some(munich)).is_none());
    }

    #[test]
    fn test_radius_does_not_leak_between_bowls() {
        // ~9.4 km north of the reference point.
        let position = coord(52.2, 11.6037);
        let table = GpsBowlTable::from_entries(
            [("Wide;50", "0.5,0.5"), ("Narrow", "52.1159,11.6037")],
            DEFAULT_DISTANCE_KM,
            &mut Vec::new(),
        )
        .unwrap();
        assert!(table.resolve(Some(position)).is_none());
    }

    #[test]
    fn test_default_distance_applies_to_bowls_without_radius() {
        let position = coord(52.2, 11.6037);
        let table = GpsBowlTable::from_entries(
            [("Home", "52.1159,11.6037")],
            10.0,
            &mut Vec::new(),
        )
        .unwrap();
        assert_eq!(table.resolve(Some(position)).unwrap().name, "Home");
    }

    #[test]
    fn test_default_bowl_and_missing_position() {
        let table = GpsBowlTable::from_entries(
            [("Home;5", "52.1159,11.6037"), ("Elsewhere", "!DEFAULT")],
            DEFAULT_DISTANCE_KM,
            &mut Vec::new(),
        )
        .unwrap();

        assert_eq!(table.resolve(Some(coord(0.0, 0.0))).unwrap().name, "Elsewhere");
        assert!(table.resolve(None).is_none());
    }

    #[test]
    fn test_distance_is_strictly_less_than_radius() {
        let bowl = GpsBowl::parse("Exact;0", "10,10", &mut Vec::new()).unwrap();
        assert!(!bowl.contains(coord(10.0, 10.0), DEFAULT_DISTANCE_KM));
    }

    #[test]
    fn test_dms_to_decimal() {
        let lat = dms_to_decimal(51.0, 30.0, 36.0, b'N');
        assert!((lat - 51.51).abs() < 1e-9);
        assert!((dms_to_decimal(33.0, 54.0, 0.0, b's') + 33.9).abs() < 1e-9);
        assert!(dms_to_decimal(10.0, 0.0, 0.0, b'W') < 0.0);
    }

    #[test]
    fn test_read_coordinates_without_exif() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("plain.jpg");
        fs::write(
            &path,
            [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x00,
             0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0xFF, 0xD9],
        )
        .expect("Failed to write image");

        assert!(read_image_coordinates(&path).unwrap().is_none());

        let text = temp_dir.path().join("notes.txt");
        fs::write(&text, "not an image").expect("Failed to write file");
        assert!(read_image_coordinates(&text).unwrap().is_none());
    }

    #[test]
    fn test_read_coordinates_missing_file() {
        let result = read_image_coordinates(Path::new("/non/existent/photo.jpg"));
        assert!(matches!(result, Err(GpsError::Io { .. })));
    }

    #[test]
    fn test_read_coordinates_from_exif() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("magdeburg.jpg");
        // 52°6'57.24"N 11°36'13.32"E
        let jpeg = geotagged_jpeg(b'N', [(52, 1), (6, 1), (5724, 100)], b'E', [(11, 1), (36, 1), (1332, 100)]);
        fs::write(&path, jpeg).expect("Failed to write image");

        let position = read_image_coordinates(&path).unwrap().expect("position");
        assert!((position.lat - 52.1159).abs() < 1e-4);
        assert!((position.lon - 11.6037).abs() < 1e-4);

        let table = GpsBowlTable::from_entries(
            [("Photos/Magdeburg;3", "52.1159,11.6037")],
            DEFAULT_DISTANCE_KM,
            &mut Vec::new(),
        )
        .unwrap();
        assert_eq!(table.resolve(Some(position)).unwrap().name, "Photos/Magdeburg");
    }

    #[test]
    fn test_read_coordinates_southern_and_western_hemispheres() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("south_west.jpg");
        // 22°54'30"S 43°10'21"W
        let jpeg = geotagged_jpeg(b'S', [(22, 1), (54, 1), (30, 1)], b'W', [(43, 1), (10, 1), (21, 1)]);
        fs::write(&path, jpeg).expect("Failed to write image");

        let position = read_image_coordinates(&path).unwrap().expect("position");
        assert!((position.lat + 22.908333).abs() < 1e-4);
        assert!((position.lon + 43.1725).abs() < 1e-4);
    }

    #[test]
    fn test_null_island_is_no_position() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("no_fix.jpg");
        let zero = [(0, 1), (0, 1), (0, 1)];
        fs::write(&path, geotagged_jpeg(b'N', zero, b'E', zero)).expect("Failed to write image");

        assert!(read_image_coordinates(&path).unwrap().is_none());
    }

    #[test]
    fn test_bowl_points_on_continuation_lines() {
        let bowl = GpsBowl::parse("Trips", "51.8,10.6;\n51.7,10.5\n52.0,10.0", &mut Vec::new()).unwrap();
        assert_eq!(bowl.points.len(), 3);
    }
}
