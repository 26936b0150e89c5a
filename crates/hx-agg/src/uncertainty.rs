//! Systematic-uncertainty aggregation.
//!
//! For every (channel, systematic, process) triple the per-bin up/down yield
//! deltas are computed from the modifier payload, summed across processes per
//! systematic, and finally combined across systematics in quadrature relative
//! to the channel's nominal stack to give one envelope per bin.
//!
//! Only `normsys`, `histosys` and `staterror` modifiers contribute; `lumi`
//! and `normfactor` are deliberately excluded from uncertainty bands.

use std::collections::BTreeMap;

use serde::Serialize;

use hx_core::Result;
use hx_model::{Modifier, Workspace};

use crate::modifiers::ResolvedKind;
use crate::normfactor::NormFactorRegistry;
use crate::yields;

/// Per-bin up/down deltas.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Band {
    /// Upward deltas per bin.
    pub hi: Vec<f64>,
    /// Downward deltas per bin.
    pub lo: Vec<f64>,
}

/// One process's contribution to one systematic, with its resolved type.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessUncertainty {
    /// Upward deltas per bin.
    pub hi: Vec<f64>,
    /// Downward deltas per bin.
    pub lo: Vec<f64>,
    /// Resolved modifier type that produced these deltas.
    pub kind: ResolvedKind,
}

/// One systematic's contributions in one channel.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SystematicUncertainty {
    /// Per-process deltas.
    pub per_process: BTreeMap<String, ProcessUncertainty>,
    /// Process-summed deltas per bin.
    pub overall: Band,
}

/// All systematic uncertainties of one channel.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelUncertainty {
    /// Per-systematic breakdown.
    pub per_systematic: BTreeMap<String, SystematicUncertainty>,
    /// Quadrature-combined envelope per bin.
    pub overall: Band,
}

/// Uncertainty summary: channel name → channel uncertainties.
pub type UncertaintySummary = BTreeMap<String, ChannelUncertainty>;

fn add_in_place(accumulator: &mut [f64], deltas: &[f64]) {
    for (a, d) in accumulator.iter_mut().zip(deltas) {
        *a += d;
    }
}

/// Per-channel, per-systematic, per-process up/down deltas.
///
/// A systematic split into `normsys` and `histosys` parts sharing one name
/// accumulates both contributions into a single `normhisto` entry.
pub fn per_systematic_per_process(ws: &Workspace) -> UncertaintySummary {
    let mut summary = UncertaintySummary::new();

    for channel in &ws.channels {
        for sample in &channel.samples {
            for modifier in &sample.modifiers {
                let (hi, lo, kind) = match modifier {
                    Modifier::NormFactor { .. } | Modifier::Lumi { .. } => continue,
                    Modifier::Unknown { kind, name, .. } => {
                        tracing::debug!(
                            modifier = %name,
                            kind = %kind,
                            "modifier type not implemented in the uncertainty calculation"
                        );
                        continue;
                    }
                    Modifier::NormSys { data, .. } => {
                        let hi: Vec<f64> =
                            sample.data.iter().map(|x| x * (data.hi - 1.0)).collect();
                        let lo: Vec<f64> =
                            sample.data.iter().map(|x| x * (data.lo - 1.0)).collect();
                        (hi, lo, ResolvedKind::NormSys)
                    }
                    Modifier::HistoSys { data, .. } => {
                        let hi: Vec<f64> =
                            data.hi_data.iter().zip(&sample.data).map(|(h, x)| h - x).collect();
                        let lo: Vec<f64> =
                            data.lo_data.iter().zip(&sample.data).map(|(l, x)| l - x).collect();
                        (hi, lo, ResolvedKind::HistoSys)
                    }
                    Modifier::StatError { data, .. } => {
                        (data.clone(), data.iter().map(|x| -x).collect(), ResolvedKind::StatError)
                    }
                };

                let per_process = &mut summary
                    .entry(channel.name.clone())
                    .or_default()
                    .per_systematic
                    .entry(modifier.name().to_string())
                    .or_default()
                    .per_process;

                match per_process.get_mut(&sample.name) {
                    None => {
                        per_process.insert(
                            sample.name.clone(),
                            ProcessUncertainty { hi, lo, kind },
                        );
                    }
                    Some(existing) => {
                        let merges = matches!(
                            (existing.kind, kind),
                            (ResolvedKind::NormSys, ResolvedKind::HistoSys)
                                | (ResolvedKind::HistoSys, ResolvedKind::NormSys)
                        );
                        if merges {
                            add_in_place(&mut existing.hi, &hi);
                            add_in_place(&mut existing.lo, &lo);
                            existing.kind = ResolvedKind::NormHisto;
                        } else {
                            tracing::warn!(
                                channel = %channel.name,
                                sample = %sample.name,
                                modifier = %modifier.name(),
                                "invalid modifier type combination"
                            );
                            *existing = ProcessUncertainty { hi, lo, kind };
                        }
                    }
                }
            }
        }
    }
    summary
}

/// Per-systematic summary with process-summed `overall` bands filled in.
pub fn per_systematic(ws: &Workspace) -> UncertaintySummary {
    let mut summary = per_systematic_per_process(ws);
    for channel in summary.values_mut() {
        for systematic in channel.per_systematic.values_mut() {
            let n_bins = systematic
                .per_process
                .values()
                .next()
                .map(|p| p.hi.len())
                .unwrap_or(0);
            let mut overall = Band { hi: vec![0.0; n_bins], lo: vec![0.0; n_bins] };
            for process in systematic.per_process.values() {
                add_in_place(&mut overall.hi, &process.hi);
                add_in_place(&mut overall.lo, &process.lo);
            }
            systematic.overall = overall;
        }
    }
    summary
}

/// Full uncertainty summary with the channel-level quadrature envelope.
///
/// Per bin, the relative deltas of all systematics are summed in quadrature
/// against the nominal stack top and scaled back to absolute yields. Bins
/// with zero nominal yield contribute nothing instead of dividing by zero.
pub fn summarize(ws: &Workspace, registry: &NormFactorRegistry) -> Result<UncertaintySummary> {
    let mut summary = per_systematic(ws);
    let stacks = yields::stacked_per_bin(ws, registry)?;

    for (channel_name, channel) in summary.iter_mut() {
        let Some(stack) = stacks.iter().find(|s| &s.name == channel_name) else {
            continue;
        };
        let nominal_per_bin: Vec<f64> = stack
            .content
            .iter()
            .map(|bin| bin.last().map(|p| p.high).unwrap_or(0.0))
            .collect();
        let n_bins = nominal_per_bin.len();

        let mut sumsq_hi = vec![0.0; n_bins];
        let mut sumsq_lo = vec![0.0; n_bins];
        for systematic in channel.per_systematic.values() {
            for i_bin in 0..n_bins {
                let nominal = nominal_per_bin[i_bin];
                if nominal == 0.0 {
                    continue;
                }
                let hi = systematic.overall.hi.get(i_bin).copied().unwrap_or(0.0);
                let lo = systematic.overall.lo.get(i_bin).copied().unwrap_or(0.0);
                sumsq_hi[i_bin] += (hi / nominal).powi(2);
                sumsq_lo[i_bin] += (lo / nominal).powi(2);
            }
        }

        let mut overall = Band { hi: vec![0.0; n_bins], lo: vec![0.0; n_bins] };
        for i_bin in 0..n_bins {
            overall.hi[i_bin] = sumsq_hi[i_bin].sqrt() * nominal_per_bin[i_bin];
            overall.lo[i_bin] = sumsq_lo[i_bin].sqrt() * nominal_per_bin[i_bin];
        }
        channel.overall = overall;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hx_model::parse_workspace;

    fn fixture() -> Workspace {
        parse_workspace(include_str!("../../../tests/fixtures/systematics_workspace.json"))
            .unwrap()
    }

    #[test]
    fn normhisto_deltas_accumulate() {
        // normsys {1.2, 0.9} and histosys {[12,8],[9,7]} on nominal [10,10]:
        // normsys  hi = [2, 2],  lo = [-1, -1]
        // histosys hi = [2, -2], lo = [-1, -3]
        let summary = per_systematic_per_process(&fixture());
        let signal = &summary["SR"].per_systematic["sys1"].per_process["signal"];
        assert_eq!(signal.kind, ResolvedKind::NormHisto);
        assert_eq!(signal.hi, vec![4.0, 0.0]);
        assert_eq!(signal.lo, vec![-2.0, -4.0]);
    }

    #[test]
    fn staterror_deltas_are_symmetric() {
        let summary = per_systematic_per_process(&fixture());
        let background = &summary["SR"].per_systematic["staterror_SR"].per_process["background"];
        assert_eq!(background.kind, ResolvedKind::StatError);
        assert_eq!(background.hi, vec![5.0, 6.0]);
        assert_eq!(background.lo, vec![-5.0, -6.0]);
    }

    #[test]
    fn lumi_normfactor_and_unknown_are_excluded() {
        let summary = per_systematic_per_process(&fixture());
        let sr = &summary["SR"];
        assert!(!sr.per_systematic.contains_key("mu"));
        assert!(!sr.per_systematic.contains_key("lumi"));
        assert!(!sr.per_systematic.contains_key("shape_bkg"));
        // CR only carries a normfactor, so no channel entry exists at all
        assert!(!summary.contains_key("CR"));
    }

    #[test]
    fn per_systematic_sums_processes() {
        let summary = per_systematic(&fixture());
        let sys1 = &summary["SR"].per_systematic["sys1"];
        // only the signal process carries sys1
        assert_eq!(sys1.overall.hi, vec![4.0, 0.0]);
        assert_eq!(sys1.overall.lo, vec![-2.0, -4.0]);
    }

    #[test]
    fn channel_envelope_combines_in_quadrature() {
        let ws = fixture();
        let registry = NormFactorRegistry::from_workspace(&ws);
        let summary = summarize(&ws, &registry).unwrap();
        let overall = &summary["SR"].overall;
        // nominal stack tops: [60, 70]
        // hi: sqrt((4/60)^2 + (5/60)^2)*60, sqrt((0/70)^2 + (6/70)^2)*70
        assert_relative_eq!(overall.hi[0], 41.0_f64.sqrt(), max_relative = 1e-12);
        assert_relative_eq!(overall.hi[1], 6.0, max_relative = 1e-12);
        // lo: sqrt((2/60)^2 + (5/60)^2)*60, sqrt((4/70)^2 + (6/70)^2)*70
        assert_relative_eq!(overall.lo[0], 29.0_f64.sqrt(), max_relative = 1e-12);
        assert_relative_eq!(overall.lo[1], 52.0_f64.sqrt(), max_relative = 1e-12);
    }

    #[test]
    fn quadrature_matches_worked_example() {
        // two systematics with overall hi-deltas 3 and 4 on nominal 100
        // must combine to an absolute 5
        let json = r#"
{
  "channels": [
    {
      "name": "ch",
      "samples": [
        {
          "name": "s",
          "data": [100.0],
          "modifiers": [
            {"name": "a", "type": "staterror", "data": [3.0]},
            {"name": "b", "type": "staterror", "data": [4.0]}
          ]
        }
      ]
    }
  ],
  "observations": [{"name": "ch", "data": [100.0]}],
  "measurements": [{"name": "m", "config": {"poi": "mu", "parameters": []}}]
}"#;
        let ws = parse_workspace(json).unwrap();
        let registry = NormFactorRegistry::from_workspace(&ws);
        let summary = summarize(&ws, &registry).unwrap();
        let overall = &summary["ch"].overall;
        assert_relative_eq!(overall.hi[0], 5.0, max_relative = 1e-12);
        assert_relative_eq!(overall.lo[0], 5.0, max_relative = 1e-12);
    }

    #[test]
    fn zero_nominal_bins_contribute_nothing() {
        let json = r#"
{
  "channels": [
    {
      "name": "ch",
      "samples": [
        {
          "name": "s",
          "data": [0.0],
          "modifiers": [
            {"name": "a", "type": "staterror", "data": [3.0]}
          ]
        }
      ]
    }
  ],
  "observations": [{"name": "ch", "data": [0.0]}],
  "measurements": [{"name": "m", "config": {"poi": "mu", "parameters": []}}]
}"#;
        let ws = parse_workspace(json).unwrap();
        let registry = NormFactorRegistry::from_workspace(&ws);
        let summary = summarize(&ws, &registry).unwrap();
        let overall = &summary["ch"].overall;
        assert_eq!(overall.hi, vec![0.0]);
        assert_eq!(overall.lo, vec![0.0]);
    }
}
