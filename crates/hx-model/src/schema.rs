//! pyhf JSON schema types
//!
//! Field names and modifier-type strings are the community HistFactory JSON
//! interchange contract and must not be renamed.

use serde::{Deserialize, Serialize};

/// pyhf workspace representation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    /// Channels
    pub channels: Vec<Channel>,
    /// Observations
    pub observations: Vec<Observation>,
    /// Measurements
    pub measurements: Vec<Measurement>,
    /// Schema version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Channel (region)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    /// Channel name
    pub name: String,
    /// Samples in this channel
    pub samples: Vec<Sample>,
}

/// Sample (process)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    /// Sample name
    pub name: String,
    /// Expected event counts per bin
    pub data: Vec<f64>,
    /// Modifiers (systematics)
    pub modifiers: Vec<Modifier>,
}

/// Modifier (systematic or normalization effect)
///
/// A workspace may carry modifier types the explorer does not visualize
/// (e.g. `shapesys`); those parse into [`Modifier::Unknown`] so the document
/// still loads, and every consumer matches the variant explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawModifier", into = "RawModifier")]
pub enum Modifier {
    /// normfactor: free-floating normalization scale
    NormFactor {
        /// Modifier name (references a parameter config).
        name: String,
        /// Optional modifier payload (unused, preserved for round-trips).
        data: Option<serde_json::Value>,
    },

    /// normsys: multiplicative normalization uncertainty
    NormSys {
        /// Modifier name.
        name: String,
        /// Hi/lo multiplicative bounds.
        data: NormSysData,
    },

    /// histosys: histogram-based shape uncertainty
    HistoSys {
        /// Modifier name.
        name: String,
        /// Up/down templates.
        data: HistoSysData,
    },

    /// staterror: per-bin statistical uncertainty
    StatError {
        /// Modifier name.
        name: String,
        /// Per-bin absolute uncertainties.
        data: Vec<f64>,
    },

    /// lumi: luminosity uncertainty
    Lumi {
        /// Modifier name.
        name: String,
        /// Optional modifier payload (unused, preserved for round-trips).
        data: Option<serde_json::Value>,
    },

    /// Any modifier type this explorer does not model.
    Unknown {
        /// Modifier name.
        name: String,
        /// Original type tag.
        kind: String,
        /// Original payload, preserved verbatim.
        data: Option<serde_json::Value>,
    },
}

/// Coarse modifier classification, independent of payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifierKind {
    /// `normfactor`
    NormFactor,
    /// `normsys`
    NormSys,
    /// `histosys`
    HistoSys,
    /// `staterror`
    StatError,
    /// `lumi`
    Lumi,
    /// Anything else
    Unknown,
}

impl std::fmt::Display for ModifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModifierKind::NormFactor => "normfactor",
            ModifierKind::NormSys => "normsys",
            ModifierKind::HistoSys => "histosys",
            ModifierKind::StatError => "staterror",
            ModifierKind::Lumi => "lumi",
            ModifierKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl Modifier {
    /// Modifier name.
    pub fn name(&self) -> &str {
        match self {
            Modifier::NormFactor { name, .. }
            | Modifier::NormSys { name, .. }
            | Modifier::HistoSys { name, .. }
            | Modifier::StatError { name, .. }
            | Modifier::Lumi { name, .. }
            | Modifier::Unknown { name, .. } => name,
        }
    }

    /// Modifier classification.
    pub fn kind(&self) -> ModifierKind {
        match self {
            Modifier::NormFactor { .. } => ModifierKind::NormFactor,
            Modifier::NormSys { .. } => ModifierKind::NormSys,
            Modifier::HistoSys { .. } => ModifierKind::HistoSys,
            Modifier::StatError { .. } => ModifierKind::StatError,
            Modifier::Lumi { .. } => ModifierKind::Lumi,
            Modifier::Unknown { .. } => ModifierKind::Unknown,
        }
    }
}

/// Wire form of a modifier: `{name, type, data}` with a free-form payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawModifier {
    /// Modifier name.
    pub name: String,
    /// Type tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-dependent payload.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

fn required_payload(
    name: &str,
    kind: &str,
    data: Option<serde_json::Value>,
) -> Result<serde_json::Value, hx_core::Error> {
    data.ok_or_else(|| {
        hx_core::Error::Validation(format!(
            "modifier '{name}' of type '{kind}' is missing its data payload"
        ))
    })
}

impl TryFrom<RawModifier> for Modifier {
    type Error = hx_core::Error;

    fn try_from(raw: RawModifier) -> Result<Self, Self::Error> {
        let RawModifier { name, kind, data } = raw;
        Ok(match kind.as_str() {
            "normfactor" => Modifier::NormFactor { name, data },
            "normsys" => {
                let payload = required_payload(&name, &kind, data)?;
                let data: NormSysData = serde_json::from_value(payload)?;
                Modifier::NormSys { name, data }
            }
            "histosys" => {
                let payload = required_payload(&name, &kind, data)?;
                let data: HistoSysData = serde_json::from_value(payload)?;
                Modifier::HistoSys { name, data }
            }
            "staterror" => {
                let payload = required_payload(&name, &kind, data)?;
                let data: Vec<f64> = serde_json::from_value(payload)?;
                Modifier::StatError { name, data }
            }
            "lumi" => Modifier::Lumi { name, data },
            _ => Modifier::Unknown { name, kind, data },
        })
    }
}

impl From<Modifier> for RawModifier {
    fn from(modifier: Modifier) -> Self {
        match modifier {
            Modifier::NormFactor { name, data } => {
                RawModifier { name, kind: "normfactor".to_string(), data }
            }
            Modifier::NormSys { name, data } => RawModifier {
                name,
                kind: "normsys".to_string(),
                data: Some(serde_json::json!({ "hi": data.hi, "lo": data.lo })),
            },
            Modifier::HistoSys { name, data } => RawModifier {
                name,
                kind: "histosys".to_string(),
                data: Some(serde_json::json!({
                    "hi_data": data.hi_data,
                    "lo_data": data.lo_data,
                })),
            },
            Modifier::StatError { name, data } => RawModifier {
                name,
                kind: "staterror".to_string(),
                data: Some(serde_json::json!(data)),
            },
            Modifier::Lumi { name, data } => RawModifier { name, kind: "lumi".to_string(), data },
            Modifier::Unknown { name, kind, data } => RawModifier { name, kind, data },
        }
    }
}

/// normsys data (hi/lo factors)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormSysData {
    /// High (up) multiplicative factor.
    pub hi: f64,
    /// Low (down) multiplicative factor.
    pub lo: f64,
}

/// histosys data (up/down histograms)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoSysData {
    /// High (up) template values.
    pub hi_data: Vec<f64>,
    /// Low (down) template values.
    pub lo_data: Vec<f64>,
}

/// Observation (data)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// Channel name this observation belongs to
    pub name: String,
    /// Observed event counts per bin
    pub data: Vec<f64>,
}

/// Measurement configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    /// Measurement name
    pub name: String,
    /// Configuration
    pub config: MeasurementConfig,
}

/// Measurement config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementConfig {
    /// Parameter of interest
    pub poi: String,
    /// Parameter configurations
    #[serde(default)]
    pub parameters: Vec<ParameterConfig>,
}

/// Parameter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterConfig {
    /// Parameter name
    pub name: String,
    /// Initial values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inits: Vec<f64>,
    /// Bounds [[min, max]]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bounds: Vec<[f64; 2]>,
    /// Whether this parameter is fixed (frozen) in fits.
    #[serde(default)]
    pub fixed: bool,
    /// Auxiliary data (constraint centers)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auxdata: Vec<f64>,
    /// Constraint widths
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sigmas: Vec<f64>,
}
