//! Normalization-factor discovery and resolution.
//!
//! Scans a workspace for `normfactor` modifiers and resolves each one against
//! the parameter configuration of the first measurement. The first
//! measurement is authoritative; further measurements are not consulted.

use std::collections::BTreeSet;

use serde::Serialize;

use hx_core::{Error, FitResults, Result};
use hx_model::{Modifier, Sample, Workspace};

/// A free or fixed normalization scale parameter.
#[derive(Debug, Clone, Serialize)]
pub struct NormFactor {
    /// Parameter name.
    pub name: String,
    /// Whether the parameter is frozen in fits.
    pub fixed: bool,
    /// Current value, editable pre-fit. Seeded from `inits[0]` (default 1.0).
    pub value: f64,
    /// Names of the processes this factor scales.
    pub processes: BTreeSet<String>,
}

/// All normalization factors of a workspace, in first-seen order.
///
/// Rebuilt whenever the workspace or its modifiers change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NormFactorRegistry {
    factors: Vec<NormFactor>,
}

impl NormFactorRegistry {
    /// Discover the normalization factors of a workspace.
    ///
    /// A `normfactor` modifier without a matching parameter config is logged
    /// and omitted; callers then see a neutral factor of 1.0 for that name.
    pub fn from_workspace(ws: &Workspace) -> Self {
        let parameters = ws
            .measurements
            .first()
            .map(|m| m.config.parameters.as_slice())
            .unwrap_or_default();

        let mut factors: Vec<NormFactor> = Vec::new();
        let mut skipped: Vec<String> = Vec::new();

        for channel in &ws.channels {
            for sample in &channel.samples {
                for modifier in &sample.modifiers {
                    let Modifier::NormFactor { name, .. } = modifier else {
                        continue;
                    };
                    if let Some(factor) = factors.iter_mut().find(|f| &f.name == name) {
                        factor.processes.insert(sample.name.clone());
                        continue;
                    }
                    if skipped.iter().any(|s| s == name) {
                        continue;
                    }
                    let Some(parameter) = parameters.iter().find(|p| &p.name == name) else {
                        tracing::warn!(
                            factor = %name,
                            "no parameter config found for normfactor; treating as unscaled"
                        );
                        skipped.push(name.clone());
                        continue;
                    };
                    factors.push(NormFactor {
                        name: name.clone(),
                        fixed: parameter.fixed,
                        value: parameter.inits.first().copied().unwrap_or(1.0),
                        processes: BTreeSet::from([sample.name.clone()]),
                    });
                }
            }
        }
        Self { factors }
    }

    /// Look up a factor by name.
    pub fn get(&self, name: &str) -> Option<&NormFactor> {
        self.factors.iter().find(|f| f.name == name)
    }

    /// Set the pre-fit value of a factor.
    pub fn set_value(&mut self, name: &str, value: f64) -> Result<()> {
        let factor = self
            .factors
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(|| Error::Validation(format!("unknown normfactor '{name}'")))?;
        factor.value = value;
        Ok(())
    }

    /// Iterate over the discovered factors in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &NormFactor> {
        self.factors.iter()
    }

    /// Number of discovered factors.
    pub fn len(&self) -> usize {
        self.factors.len()
    }

    /// Whether the workspace has no normalization factors.
    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Effective multiplier for one factor name.
    ///
    /// Pre-fit this is the registry's current value; post-fit it is the
    /// best-fit value from the supplied fit results. Unknown names and
    /// missing fit results resolve to the neutral 1.0.
    pub fn resolve(&self, name: &str, postfit: bool, fit: Option<&FitResults>) -> f64 {
        if postfit {
            return fit.and_then(|f| f.bestfit_for(name)).unwrap_or(1.0);
        }
        self.get(name).map(|f| f.value).unwrap_or(1.0)
    }

    /// Combined multiplier for a sample: the product over all its
    /// `normfactor` modifiers.
    pub fn factor_for_sample(
        &self,
        sample: &Sample,
        postfit: bool,
        fit: Option<&FitResults>,
    ) -> f64 {
        sample
            .modifiers
            .iter()
            .filter_map(|m| match m {
                Modifier::NormFactor { name, .. } => Some(self.resolve(name, postfit, fit)),
                _ => None,
            })
            .product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hx_model::parse_workspace;

    fn fixture() -> Workspace {
        parse_workspace(include_str!("../../../tests/fixtures/systematics_workspace.json"))
            .unwrap()
    }

    #[test]
    fn discovers_configured_factors_only() {
        let registry = NormFactorRegistry::from_workspace(&fixture());
        // k_bkg has no parameter config and is omitted
        assert_eq!(registry.len(), 1);
        let mu = registry.get("mu").unwrap();
        assert!(!mu.fixed);
        assert_eq!(mu.value, 1.0);
        assert!(mu.processes.contains("signal"));
    }

    #[test]
    fn missing_parameter_resolves_neutral() {
        let registry = NormFactorRegistry::from_workspace(&fixture());
        assert_eq!(registry.resolve("k_bkg", false, None), 1.0);
    }

    #[test]
    fn prefit_value_is_editable() {
        let mut registry = NormFactorRegistry::from_workspace(&fixture());
        registry.set_value("mu", 2.5).unwrap();
        assert_eq!(registry.resolve("mu", false, None), 2.5);
        assert!(registry.set_value("nope", 1.0).is_err());
    }

    #[test]
    fn postfit_prefers_fit_results() {
        let registry = NormFactorRegistry::from_workspace(&fixture());
        let fit = FitResults {
            bestfit: vec![1.7],
            uncertainty: vec![0.2],
            correlations: vec![vec![1.0]],
            labels: vec!["mu".to_string()],
        };
        assert_eq!(registry.resolve("mu", true, Some(&fit)), 1.7);
        // absent label falls back to neutral
        assert_eq!(registry.resolve("k_bkg", true, Some(&fit)), 1.0);
        // no fit results at all is also neutral
        assert_eq!(registry.resolve("mu", true, None), 1.0);
    }

    #[test]
    fn sample_factor_is_product_of_attached_factors() {
        let ws = fixture();
        let mut registry = NormFactorRegistry::from_workspace(&ws);
        registry.set_value("mu", 3.0).unwrap();
        let signal = ws.channels[0].sample("signal").unwrap();
        assert_eq!(registry.factor_for_sample(signal, false, None), 3.0);
        let background = ws.channels[0].sample("background").unwrap();
        assert_eq!(registry.factor_for_sample(background, false, None), 1.0);
    }
}
