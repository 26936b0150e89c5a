//! Numbers-first JSON artifacts emitted by the CLI.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use hx_agg::{NormFactorRegistry, StackedChannel, StackedChannelBinwise, UncertaintySummary};
use hx_core::{FitResults, Result};
use hx_model::Workspace;

/// Common artifact metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Meta {
    pub tool: String,
    pub tool_version: String,
    pub created_unix_ms: u128,
}

impl Meta {
    pub fn new() -> Result<Self> {
        let created = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| hx_core::Error::Computation(format!("system time error: {e}")))?;
        Ok(Self {
            tool: "histoscope".to_string(),
            tool_version: hx_core::VERSION.to_string(),
            created_unix_ms: created.as_millis(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct YieldsArtifact {
    pub schema_version: String,
    pub meta: Meta,
    pub process_order: Vec<String>,
    pub channels: Vec<YieldsChannel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct YieldsChannel {
    pub channel_name: String,
    pub data: f64,
    pub total_prefit: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_postfit: Option<f64>,
    pub processes: Vec<YieldsProcess>,
}

#[derive(Debug, Clone, Serialize)]
pub struct YieldsProcess {
    pub name: String,
    pub prefit: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postfit: Option<f64>,
}

fn stack_heights(channel: &StackedChannelBinwise) -> Vec<(String, f64)> {
    let mut sums: Vec<(String, f64)> = Vec::new();
    for bin in &channel.content {
        for slot in bin {
            match sums.iter_mut().find(|(name, _)| name == &slot.name) {
                Some((_, total)) => *total += slot.high - slot.low,
                None => sums.push((slot.name.clone(), slot.high - slot.low)),
            }
        }
    }
    sums
}

/// Build the per-channel yields artifact, with post-fit columns when fit
/// results are available.
pub fn yields_artifact(
    ws: &Workspace,
    registry: &NormFactorRegistry,
    fit: Option<&FitResults>,
) -> Result<YieldsArtifact> {
    let process_order = hx_agg::yields::process_names(ws, registry);
    let prefit = hx_agg::yields::stacked_per_bin(ws, registry)?;
    let postfit = match fit {
        Some(_) => Some(hx_agg::postfit::stacked_per_bin(ws, registry, fit)?),
        None => None,
    };

    let mut channels = Vec::with_capacity(prefit.len());
    for (index, channel) in prefit.iter().enumerate() {
        let prefit_sums = stack_heights(channel);
        let postfit_sums = postfit.as_ref().map(|stacks| stack_heights(&stacks[index]));

        let processes = process_order
            .iter()
            .map(|name| YieldsProcess {
                name: name.clone(),
                prefit: prefit_sums
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, y)| *y)
                    .unwrap_or(0.0),
                postfit: postfit_sums.as_ref().map(|sums| {
                    sums.iter().find(|(n, _)| n == name).map(|(_, y)| *y).unwrap_or(0.0)
                }),
            })
            .collect::<Vec<_>>();

        channels.push(YieldsChannel {
            channel_name: channel.name.clone(),
            data: channel.data.iter().sum(),
            total_prefit: processes.iter().map(|p| p.prefit).sum(),
            total_postfit: postfit_sums
                .as_ref()
                .map(|sums| sums.iter().map(|(_, y)| y).sum()),
            processes,
        });
    }

    Ok(YieldsArtifact {
        schema_version: "histoscope_yields_v0".to_string(),
        meta: Meta::new()?,
        process_order,
        channels,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct StacksArtifact {
    pub schema_version: String,
    pub meta: Meta,
    pub mode: String,
    pub channels: Vec<StackedChannel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BinwiseStacksArtifact {
    pub schema_version: String,
    pub meta: Meta,
    pub mode: String,
    pub channels: Vec<StackedChannelBinwise>,
}

/// Build the channel-level stacks artifact (absolute or normalized).
pub fn stacks_artifact(
    ws: &Workspace,
    registry: &NormFactorRegistry,
    normalized: bool,
) -> Result<StacksArtifact> {
    let (mode, channels) = if normalized {
        ("normalized", hx_agg::yields::normalized_stacked(ws, registry))
    } else {
        ("absolute", hx_agg::yields::stacked(ws, registry))
    };
    Ok(StacksArtifact {
        schema_version: "histoscope_stacks_v0".to_string(),
        meta: Meta::new()?,
        mode: mode.to_string(),
        channels,
    })
}

/// Build the per-bin stacks artifact, post-fit when fit results are given.
pub fn binwise_stacks_artifact(
    ws: &Workspace,
    registry: &NormFactorRegistry,
    fit: Option<&FitResults>,
) -> Result<BinwiseStacksArtifact> {
    let mode = if fit.is_some() { "per_bin_postfit" } else { "per_bin_prefit" };
    let channels = hx_agg::postfit::stacked_per_bin(ws, registry, fit)?;
    Ok(BinwiseStacksArtifact {
        schema_version: "histoscope_stacks_v0".to_string(),
        meta: Meta::new()?,
        mode: mode.to_string(),
        channels,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct UncertaintyArtifact {
    pub schema_version: String,
    pub meta: Meta,
    pub channels: UncertaintySummary,
}

/// Build the uncertainty-summary artifact.
pub fn uncertainty_artifact(
    ws: &Workspace,
    registry: &NormFactorRegistry,
) -> Result<UncertaintyArtifact> {
    Ok(UncertaintyArtifact {
        schema_version: "histoscope_uncertainty_v0".to_string(),
        meta: Meta::new()?,
        channels: hx_agg::uncertainty::summarize(ws, registry)?,
    })
}
