//! Yield aggregation and stacked-histogram construction.
//!
//! All yields apply the normalization-factor product multiplicatively before
//! stacking. Stack slots follow the workspace-wide process ordering, so a
//! process absent from a channel still occupies a zero-height slot and
//! legends stay aligned across channels.

use serde::Serialize;

use hx_core::Result;
use hx_model::Workspace;

use crate::normfactor::NormFactorRegistry;

/// One slot of a stacked histogram: cumulative low/high yields of a process.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackedProcess {
    /// Process name.
    pub name: String,
    /// Lower edge (cumulative yield below this process).
    pub low: f64,
    /// Upper edge (cumulative yield including this process).
    pub high: f64,
}

/// A channel's stack of overall process yields.
#[derive(Debug, Clone, Serialize)]
pub struct StackedChannel {
    /// Channel name.
    pub name: String,
    /// One slot per process, in workspace process order.
    pub processes: Vec<StackedProcess>,
}

/// A channel's per-bin stacks plus its observed data for overlay.
#[derive(Debug, Clone, Serialize)]
pub struct StackedChannelBinwise {
    /// Channel name.
    pub name: String,
    /// One stack per bin, each in workspace process order.
    pub content: Vec<Vec<StackedProcess>>,
    /// Observed bin counts.
    pub data: Vec<f64>,
}

/// Total pre-fit yield of every process across all channels, in first-seen
/// order.
pub fn total_yield_per_process(
    ws: &Workspace,
    registry: &NormFactorRegistry,
) -> Vec<(String, f64)> {
    let mut yields: Vec<(String, f64)> = Vec::new();
    for channel in &ws.channels {
        for sample in &channel.samples {
            let factor = registry.factor_for_sample(sample, false, None);
            let total: f64 = sample.data.iter().sum::<f64>() * factor;
            match yields.iter_mut().find(|(name, _)| name == &sample.name) {
                Some((_, y)) => *y += total,
                None => yields.push((sample.name.clone(), total)),
            }
        }
    }
    yields
}

/// Total pre-fit yield of one process across all channels.
pub fn total_yield(ws: &Workspace, registry: &NormFactorRegistry, process: &str) -> f64 {
    total_yield_per_process(ws, registry)
        .into_iter()
        .find(|(name, _)| name == process)
        .map(|(_, y)| y)
        .unwrap_or(0.0)
}

/// Pre-fit yield of one process in one channel. Missing processes and
/// unknown channels contribute zero.
pub fn yield_in_channel(
    ws: &Workspace,
    registry: &NormFactorRegistry,
    channel: &str,
    process: &str,
) -> f64 {
    let Some(channel) = ws.channel(channel) else {
        return 0.0;
    };
    channel
        .sample(process)
        .map(|s| s.data.iter().sum::<f64>() * registry.factor_for_sample(s, false, None))
        .unwrap_or(0.0)
}

/// All process names, ordered by descending total yield.
///
/// Ties keep first-seen order. This ordering is the display contract for
/// stacking and must match between all stack variants.
pub fn process_names(ws: &Workspace, registry: &NormFactorRegistry) -> Vec<String> {
    let mut yields = total_yield_per_process(ws, registry);
    // stable sort keeps first-seen order for equal yields
    yields.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    yields.into_iter().map(|(name, _)| name).collect()
}

/// Absolute stacked yields per channel.
pub fn stacked(ws: &Workspace, registry: &NormFactorRegistry) -> Vec<StackedChannel> {
    let order = process_names(ws, registry);
    ws.channels
        .iter()
        .map(|channel| {
            let mut previous_high = 0.0;
            let processes = order
                .iter()
                .map(|process| {
                    let yields = yield_in_channel(ws, registry, &channel.name, process);
                    let slot = StackedProcess {
                        name: process.clone(),
                        low: previous_high,
                        high: previous_high + yields,
                    };
                    previous_high = slot.high;
                    slot
                })
                .collect();
            StackedChannel { name: channel.name.clone(), processes }
        })
        .collect()
}

/// Stacked yields per channel, rescaled so the top of each stack is 100.
///
/// The denominator is the high edge of the last slot, i.e. the full stack
/// height. A zero-height stack yields an all-zero channel instead of NaNs.
pub fn normalized_stacked(ws: &Workspace, registry: &NormFactorRegistry) -> Vec<StackedChannel> {
    let mut stacks = stacked(ws, registry);
    for channel in &mut stacks {
        let total = channel.processes.last().map(|p| p.high).unwrap_or(0.0);
        if total == 0.0 {
            tracing::warn!(channel = %channel.name, "zero total yield; emitting flat stack");
            for process in &mut channel.processes {
                process.low = 0.0;
                process.high = 0.0;
            }
            continue;
        }
        for process in &mut channel.processes {
            process.low = process.low / total * 100.0;
            process.high = process.high / total * 100.0;
        }
    }
    stacks
}

/// Per-bin stacked yields per channel, with observed data alongside.
pub fn stacked_per_bin(
    ws: &Workspace,
    registry: &NormFactorRegistry,
) -> Result<Vec<StackedChannelBinwise>> {
    let order = process_names(ws, registry);
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
                        .map(|s| s.data[i_bin] * registry.factor_for_sample(s, false, None))
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

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hx_model::parse_workspace;

    fn simple() -> Workspace {
        parse_workspace(include_str!("../../../tests/fixtures/simple_workspace.json")).unwrap()
    }

    fn systematics() -> Workspace {
        parse_workspace(include_str!("../../../tests/fixtures/systematics_workspace.json"))
            .unwrap()
    }

    #[test]
    fn process_names_sorted_by_descending_yield() {
        let ws = simple();
        let registry = NormFactorRegistry::from_workspace(&ws);
        // A = 30, B = 10
        assert_eq!(process_names(&ws, &registry), vec!["A", "B"]);
    }

    #[test]
    fn process_names_ties_keep_first_seen_order() {
        let json = r#"
{
  "channels": [
    {
      "name": "ch",
      "samples": [
        {"name": "x", "data": [5.0], "modifiers": []},
        {"name": "y", "data": [5.0], "modifiers": []}
      ]
    }
  ],
  "observations": [{"name": "ch", "data": [10.0]}],
  "measurements": [{"name": "m", "config": {"poi": "mu", "parameters": []}}]
}"#;
        let ws = parse_workspace(json).unwrap();
        let registry = NormFactorRegistry::from_workspace(&ws);
        assert_eq!(process_names(&ws, &registry), vec!["x", "y"]);
    }

    #[test]
    fn normfactor_scaling_can_reorder_processes() {
        let ws = systematics();
        let mut registry = NormFactorRegistry::from_workspace(&ws);
        // background 210 vs signal 20
        assert_eq!(process_names(&ws, &registry), vec!["background", "signal"]);
        registry.set_value("mu", 30.0).unwrap();
        // signal 600 vs background 210
        assert_eq!(process_names(&ws, &registry), vec!["signal", "background"]);
    }

    #[test]
    fn yield_lookups() {
        let ws = systematics();
        let registry = NormFactorRegistry::from_workspace(&ws);
        assert_relative_eq!(total_yield(&ws, &registry, "background"), 210.0);
        assert_relative_eq!(yield_in_channel(&ws, &registry, "SR", "background"), 110.0);
        assert_relative_eq!(yield_in_channel(&ws, &registry, "CR", "signal"), 0.0);
        assert_relative_eq!(yield_in_channel(&ws, &registry, "nope", "signal"), 0.0);
    }

    #[test]
    fn stacked_simple_workspace() {
        let ws = simple();
        let registry = NormFactorRegistry::from_workspace(&ws);
        let stacks = stacked(&ws, &registry);
        assert_eq!(stacks.len(), 1);
        let processes = &stacks[0].processes;
        assert_eq!(processes[0].name, "A");
        assert_relative_eq!(processes[0].low, 0.0);
        assert_relative_eq!(processes[0].high, 30.0);
        assert_eq!(processes[1].name, "B");
        assert_relative_eq!(processes[1].low, 30.0);
        assert_relative_eq!(processes[1].high, 40.0);
    }

    #[test]
    fn normalized_stack_tops_at_100() {
        let ws = systematics();
        let registry = NormFactorRegistry::from_workspace(&ws);
        for channel in normalized_stacked(&ws, &registry) {
            let top = channel.processes.last().unwrap().high;
            assert_relative_eq!(top, 100.0, max_relative = 1e-12);
        }
    }

    #[test]
    fn normalized_stack_of_empty_channel_is_all_zero() {
        let json = r#"
{
  "channels": [
    {"name": "ch", "samples": [{"name": "s", "data": [0.0], "modifiers": []}]}
  ],
  "observations": [{"name": "ch", "data": [0.0]}],
  "measurements": [{"name": "m", "config": {"poi": "mu", "parameters": []}}]
}"#;
        let ws = parse_workspace(json).unwrap();
        let registry = NormFactorRegistry::from_workspace(&ws);
        let stacks = normalized_stacked(&ws, &registry);
        for process in &stacks[0].processes {
            assert_eq!(process.low, 0.0);
            assert_eq!(process.high, 0.0);
        }
    }

    #[test]
    fn stacked_per_bin_matches_spec_example() {
        let ws = simple();
        let registry = NormFactorRegistry::from_workspace(&ws);
        let stacks = stacked_per_bin(&ws, &registry).unwrap();
        assert_eq!(stacks.len(), 1);
        let channel = &stacks[0];
        assert_eq!(channel.data, vec![18.0, 22.0]);

        let bin0 = &channel.content[0];
        assert_eq!(bin0[0], StackedProcess { name: "A".to_string(), low: 0.0, high: 10.0 });
        assert_eq!(bin0[1], StackedProcess { name: "B".to_string(), low: 10.0, high: 15.0 });

        let bin1 = &channel.content[1];
        assert_eq!(bin1[0], StackedProcess { name: "A".to_string(), low: 0.0, high: 20.0 });
        assert_eq!(bin1[1], StackedProcess { name: "B".to_string(), low: 20.0, high: 25.0 });
    }

    #[test]
    fn absent_process_occupies_zero_height_slot() {
        let ws = systematics();
        let registry = NormFactorRegistry::from_workspace(&ws);
        let stacks = stacked_per_bin(&ws, &registry).unwrap();
        let cr = stacks.iter().find(|c| c.name == "CR").unwrap();
        // ordering is background, signal; signal is absent in CR
        let bin0 = &cr.content[0];
        assert_eq!(bin0.len(), 2);
        assert_eq!(bin0[0].name, "background");
        assert_relative_eq!(bin0[0].high, 100.0);
        assert_eq!(bin0[1].name, "signal");
        assert_relative_eq!(bin0[1].low, 100.0);
        assert_relative_eq!(bin0[1].high, 100.0);
    }

    #[test]
    fn per_bin_stack_top_equals_process_sum() {
        let ws = systematics();
        let registry = NormFactorRegistry::from_workspace(&ws);
        for channel in stacked_per_bin(&ws, &registry).unwrap() {
            let ch = ws.channel(&channel.name).unwrap();
            for (i_bin, stack) in channel.content.iter().enumerate() {
                let total: f64 = ch
                    .samples
                    .iter()
                    .map(|s| s.data[i_bin] * registry.factor_for_sample(s, false, None))
                    .sum();
                assert_relative_eq!(stack.last().unwrap().high, total, max_relative = 1e-12);
            }
        }
    }
}
