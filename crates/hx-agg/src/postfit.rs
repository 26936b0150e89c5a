//! Post-fit projection of per-bin stacks.
//!
//! Re-derives each channel's per-bin stack from externally computed fit
//! results: sample yields pick up the best-fit normalization product and a
//! pull factor per attached systematic. Without fit results the projector is
//! a pass-through returning the pre-fit stack.

use hx_core::{FitResults, Result};
use hx_model::{Modifier, Sample, Workspace};

use crate::normfactor::NormFactorRegistry;
use crate::yields::{self, StackedChannelBinwise, StackedProcess};

/// Pull factor of one systematic on one bin: the best-fit nuisance value
/// scales the modifier's up-shift relative to nominal. Bins with zero
/// nominal yield and parameters absent from the fit stay neutral.
fn pull_factor(modifier: &Modifier, fit: &FitResults, nominal: f64, i_bin: usize) -> f64 {
    match modifier {
        Modifier::NormSys { name, data } => fit
            .bestfit_for(name)
            .map(|theta| 1.0 + theta * (data.hi - 1.0))
            .unwrap_or(1.0),
        Modifier::HistoSys { name, data } => {
            if nominal == 0.0 {
                return 1.0;
            }
            fit.bestfit_for(name)
                .map(|theta| 1.0 + theta * (data.hi_data[i_bin] / nominal - 1.0))
                .unwrap_or(1.0)
        }
        Modifier::NormFactor { .. }
        | Modifier::StatError { .. }
        | Modifier::Lumi { .. }
        | Modifier::Unknown { .. } => 1.0,
    }
}

/// Post-fit height of one sample in one bin.
///
/// The normalization product is clamped to be non-negative, and so is the
/// final height: a post-fit yield never goes negative.
fn postfit_bin_height(
    sample: &Sample,
    registry: &NormFactorRegistry,
    fit: &FitResults,
    i_bin: usize,
) -> f64 {
    let nominal = sample.data[i_bin];
    let norm = registry.factor_for_sample(sample, true, Some(fit)).max(0.0);
    let mut height = nominal * norm;
    for modifier in &sample.modifiers {
        height *= pull_factor(modifier, fit, nominal, i_bin);
    }
    height.max(0.0)
}

/// Per-bin stacked yields per channel, refined by fit results when present.
///
/// With `fit == None` this returns the pre-fit stack unchanged.
pub fn stacked_per_bin(
    ws: &Workspace,
    registry: &NormFactorRegistry,
    fit: Option<&FitResults>,
) -> Result<Vec<StackedChannelBinwise>> {
    let Some(fit) = fit else {
        return yields::stacked_per_bin(ws, registry);
    };

    let order = yields::process_names(ws, registry);
    let mut out = Vec::with_capacity(ws.channels.len());
    for (index, channel) in ws.channels.iter().enumerate() {
        let data = ws.observation_data(index)?.to_vec();
        let n_bins = channel.n_bins();
        let mut content = Vec::with_capacity(n_bins);
        for i_bin in 0..n_bins {
            let mut previous_high = 0.0;
            let stack = order
                .iter()
                .map(|process| {
                    let value = channel
                        .sample(process)
                        .map(|s| postfit_bin_height(s, registry, fit, i_bin))
                        .unwrap_or(0.0);
                    let slot = StackedProcess {
                        name: process.clone(),
                        low: previous_high,
                        high: previous_high + value,
                    };
                    previous_high = slot.high;
                    slot
                })
                .collect();
            content.push(stack);
        }
        out.push(StackedChannelBinwise { name: channel.name.clone(), content, data });
    }
    Ok(out)
}
