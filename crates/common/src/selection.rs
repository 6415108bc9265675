// Selection fingerprint: `<layer>/<datatype>@<x1>_<y1>_<x2>_<y2>_...`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Serialized form of the first selected polygon, used for change detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionFingerprint {
    pub layer: u32,
    pub datatype: u32,
    /// Hull points in layout database units.
    pub points: Vec<(i64, i64)>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FingerprintParseError {
    #[error("fingerprint is missing the `@` separator")]
    MissingSeparator,

    #[error("invalid layer spec `{0}`, expected `<layer>/<datatype>`")]
    InvalidLayer(String),

    #[error("invalid coordinate `{0}`")]
    InvalidCoordinate(String),

    #[error("fingerprint has an odd number of coordinates")]
    UnpairedCoordinate,
}

impl fmt::Display for SelectionFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@", self.layer, self.datatype)?;
        for (index, (x, y)) in self.points.iter().enumerate() {
            if index > 0 {
                f.write_str("_")?;
            }
            write!(f, "{x}_{y}")?;
        }
        Ok(())
    }
}

impl FromStr for SelectionFingerprint {
    type Err = FingerprintParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (layer_spec, coords) =
            input.split_once('@').ok_or(FingerprintParseError::MissingSeparator)?;

        let (layer, datatype) = layer_spec
            .split_once('/')
            .and_then(|(layer, datatype)| Some((layer.parse().ok()?, datatype.parse().ok()?)))
            .ok_or_else(|| FingerprintParseError::InvalidLayer(layer_spec.to_string()))?;

        let values = if coords.is_empty() {
            Vec::new()
        } else {
            coords
                .split('_')
                .map(|raw| {
                    raw.parse::<i64>()
                        .map_err(|_| FingerprintParseError::InvalidCoordinate(raw.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        if values.len() % 2 != 0 {
            return Err(FingerprintParseError::UnpairedCoordinate);
        }

        let points = values.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect();
        Ok(Self { layer, datatype, points })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_layer_and_hull() {
        let fingerprint = SelectionFingerprint {
            layer: 1,
            datatype: 0,
            points: vec![(0, 0), (10, 0), (10, 10)],
        };
        assert_eq!(fingerprint.to_string(), "1/0@0_0_10_0_10_10");
    }

    #[test]
    fn negative_coordinates_survive_parsing() {
        let parsed: SelectionFingerprint = "63/2@-5_-5_-5_5_5_5_5_-5".parse().unwrap();
        assert_eq!(parsed.layer, 63);
        assert_eq!(parsed.datatype, 2);
        assert_eq!(parsed.points, vec![(-5, -5), (-5, 5), (5, 5), (5, -5)]);
        assert_eq!(parsed.to_string(), "63/2@-5_-5_-5_5_5_5_5_-5");
    }

    #[test]
    fn rejects_malformed_fingerprints() {
        assert_eq!(
            "1/0".parse::<SelectionFingerprint>(),
            Err(FingerprintParseError::MissingSeparator)
        );
        assert_eq!(
            "x/0@0_0".parse::<SelectionFingerprint>(),
            Err(FingerprintParseError::InvalidLayer("x/0".into()))
        );
        assert_eq!(
            "1/0@0_a".parse::<SelectionFingerprint>(),
            Err(FingerprintParseError::InvalidCoordinate("a".into()))
        );
        assert_eq!(
            "1/0@0_0_1".parse::<SelectionFingerprint>(),
            Err(FingerprintParseError::UnpairedCoordinate)
        );
    }
}
