//! Modifier-type resolution.
//!
//! Classifies, per (channel, sample, modifier name), the combined modifier
//! type. A systematic that is split into a `normsys` and a `histosys` part
//! sharing one name resolves to the merged [`ResolvedKind::NormHisto`].

use std::collections::BTreeMap;

use serde::Serialize;

use hx_model::{ModifierKind, Workspace};

/// Resolved classification of one modifier name on one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedKind {
    /// The sample does not carry this modifier.
    None,
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
    /// Merged `normsys` + `histosys` pair sharing one name.
    NormHisto,
    /// A modifier type the explorer does not model.
    Unknown,
}

impl std::fmt::Display for ResolvedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResolvedKind::None => "none",
            ResolvedKind::NormFactor => "normfactor",
            ResolvedKind::NormSys => "normsys",
            ResolvedKind::HistoSys => "histosys",
            ResolvedKind::StatError => "staterror",
            ResolvedKind::Lumi => "lumi",
            ResolvedKind::NormHisto => "normhisto",
            ResolvedKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl From<ModifierKind> for ResolvedKind {
    fn from(kind: ModifierKind) -> Self {
        match kind {
            ModifierKind::NormFactor => ResolvedKind::NormFactor,
            ModifierKind::NormSys => ResolvedKind::NormSys,
            ModifierKind::HistoSys => ResolvedKind::HistoSys,
            ModifierKind::StatError => ResolvedKind::StatError,
            ModifierKind::Lumi => ResolvedKind::Lumi,
            ModifierKind::Unknown => ResolvedKind::Unknown,
        }
    }
}

/// Per-sample resolved modifier types: modifier name → kind.
pub type SampleModifierTypes = BTreeMap<String, ResolvedKind>;

/// Resolved modifier types for every (channel, sample, modifier name) triple.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModifierTypes {
    by_channel: BTreeMap<String, BTreeMap<String, SampleModifierTypes>>,
}

impl ModifierTypes {
    /// Resolve modifier types for a whole workspace.
    ///
    /// Every (sample, known modifier name) pair is seeded with
    /// [`ResolvedKind::None`] from the workspace-wide name set, so lookups
    /// stay symmetric even when a sample lacks a modifier present elsewhere.
    pub fn resolve(ws: &Workspace) -> Self {
        let known_names = ws.modifier_names();
        let mut by_channel = BTreeMap::new();

        for channel in &ws.channels {
            let mut by_sample = BTreeMap::new();
            for sample in &channel.samples {
                let mut types: SampleModifierTypes = known_names
                    .iter()
                    .map(|name| (name.clone(), ResolvedKind::None))
                    .collect();

                for modifier in &sample.modifiers {
                    let incoming = ResolvedKind::from(modifier.kind());
                    let entry =
                        types.entry(modifier.name().to_string()).or_insert(ResolvedKind::None);
                    *entry = match (*entry, incoming) {
                        (ResolvedKind::HistoSys, ResolvedKind::NormSys)
                        | (ResolvedKind::NormSys, ResolvedKind::HistoSys) => {
                            ResolvedKind::NormHisto
                        }
                        (current, incoming) => {
                            if current != ResolvedKind::None && current != incoming {
                                tracing::warn!(
                                    channel = %channel.name,
                                    sample = %sample.name,
                                    modifier = %modifier.name(),
                                    current = %current,
                                    incoming = %incoming,
                                    "invalid modifier type combination"
                                );
                            }
                            incoming
                        }
                    };
                }
                by_sample.insert(sample.name.clone(), types);
            }
            by_channel.insert(channel.name.clone(), by_sample);
        }
        Self { by_channel }
    }

    /// Resolved type for one (channel, sample, modifier name) triple.
    ///
    /// Unknown channels or samples resolve to [`ResolvedKind::None`].
    pub fn resolved(&self, channel: &str, sample: &str, modifier: &str) -> ResolvedKind {
        self.by_channel
            .get(channel)
            .and_then(|c| c.get(sample))
            .and_then(|s| s.get(modifier))
            .copied()
            .unwrap_or(ResolvedKind::None)
    }

    /// All resolved types for one channel: sample name → modifier name → kind.
    pub fn channel(&self, channel: &str) -> Option<&BTreeMap<String, SampleModifierTypes>> {
        self.by_channel.get(channel)
    }
}
