//! Workspace-level helpers and structural validation.

use hx_core::{Error, Result};

use crate::schema::{Channel, Modifier, Workspace};

/// Parse and validate a workspace document.
///
/// On any failure nothing is returned, so callers never observe a partially
/// valid workspace.
pub fn parse_workspace(json: &str) -> Result<Workspace> {
    let ws: Workspace = serde_json::from_str(json)?;
    ws.validate()?;
    Ok(ws)
}

impl Workspace {
    /// Channel names, in document order.
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    /// Look up a channel by name.
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// All distinct modifier names across the workspace, in first-seen order.
    pub fn modifier_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for channel in &self.channels {
            for sample in &channel.samples {
                for modifier in &sample.modifiers {
                    if !names.iter().any(|n| n == modifier.name()) {
                        names.push(modifier.name().to_string());
                    }
                }
            }
        }
        names
    }

    /// All distinct process (sample) names across channels, in first-seen order.
    pub fn process_name_union(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for channel in &self.channels {
            for sample in &channel.samples {
                if !names.iter().any(|n| n == &sample.name) {
                    names.push(sample.name.clone());
                }
            }
        }
        names
    }

    /// Observed data for the i-th channel. Observations are aligned with
    /// channels by index.
    pub fn observation_data(&self, channel_index: usize) -> Result<&[f64]> {
        self.observations
            .get(channel_index)
            .map(|o| o.data.as_slice())
            .ok_or_else(|| {
                Error::Validation(format!("no observation for channel index {channel_index}"))
            })
    }

    /// Check the structural invariants of the document.
    ///
    /// Errors abort the load; name mismatches between index-aligned channels
    /// and observations are only logged, since bin counts still line up.
    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(Error::Validation("workspace has no channels".to_string()));
        }
        if self.measurements.is_empty() {
            return Err(Error::Validation("workspace has no measurements".to_string()));
        }
        if self.observations.len() != self.channels.len() {
            return Err(Error::Validation(format!(
                "observation/channel count mismatch: {} observations, {} channels",
                self.observations.len(),
                self.channels.len()
            )));
        }

        for (index, channel) in self.channels.iter().enumerate() {
            let observation = &self.observations[index];
            if observation.name != channel.name {
                tracing::warn!(
                    channel = %channel.name,
                    observation = %observation.name,
                    "observation name does not match index-aligned channel"
                );
            }
            channel.validate(observation.data.len())?;
        }
        Ok(())
    }
}

impl Channel {
    /// Number of bins, taken from the first sample.
    pub fn n_bins(&self) -> usize {
        self.samples.first().map(|s| s.data.len()).unwrap_or(0)
    }

    /// Look up a sample by name.
    pub fn sample(&self, name: &str) -> Option<&crate::schema::Sample> {
        self.samples.iter().find(|s| s.name == name)
    }

    fn validate(&self, observed_bins: usize) -> Result<()> {
        if self.samples.is_empty() {
            return Err(Error::Validation(format!("channel '{}' has no samples", self.name)));
        }
        let n_bins = self.n_bins();
        if observed_bins != n_bins {
            return Err(Error::Validation(format!(
                "channel '{}': observation has {} bins, samples have {}",
                self.name, observed_bins, n_bins
            )));
        }
        for sample in &self.samples {
            if sample.data.len() != n_bins {
                return Err(Error::Validation(format!(
                    "channel '{}': sample '{}' has {} bins, expected {}",
                    self.name,
                    sample.name,
                    sample.data.len(),
                    n_bins
                )));
            }
            for modifier in &sample.modifiers {
                match modifier {
                    Modifier::HistoSys { name, data } => {
                        if data.hi_data.len() != n_bins || data.lo_data.len() != n_bins {
                            return Err(Error::Validation(format!(
                                "channel '{}': histosys '{}' templates have {}/{} bins, expected {}",
                                self.name,
                                name,
                                data.hi_data.len(),
                                data.lo_data.len(),
                                n_bins
                            )));
                        }
                    }
                    Modifier::StatError { name, data } => {
                        if data.len() != n_bins {
                            return Err(Error::Validation(format!(
                                "channel '{}': staterror '{}' has {} bins, expected {}",
                                self.name,
                                name,
                                data.len(),
                                n_bins
                            )));
                        }
                    }
                    Modifier::NormFactor { .. }
                    | Modifier::NormSys { .. }
                    | Modifier::Lumi { .. }
                    | Modifier::Unknown { .. } => {}
                }
            }
        }
        Ok(())
    }
}
