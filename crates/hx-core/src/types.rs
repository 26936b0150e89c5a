//! Common data types for Histoscope

use serde::{Deserialize, Serialize};

/// Fit results from an external fit service.
///
/// All arrays are parallel: `bestfit[i]`, `uncertainty[i]` and
/// `correlations[i]` describe the parameter named `labels[i]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResults {
    /// Best-fit parameter values
    pub bestfit: Vec<f64>,

    /// Parameter uncertainties
    pub uncertainty: Vec<f64>,

    /// Correlation matrix (row per parameter)
    pub correlations: Vec<Vec<f64>>,

    /// Parameter names
    pub labels: Vec<String>,
}

impl FitResults {
    /// Index of a parameter by name.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Best-fit value for a named parameter. `None` if the label is unknown.
    pub fn bestfit_for(&self, label: &str) -> Option<f64> {
        self.index_of(label).and_then(|i| self.bestfit.get(i)).copied()
    }

    /// Uncertainty for a named parameter. `None` if the label is unknown.
    pub fn uncertainty_for(&self, label: &str) -> Option<f64> {
        self.index_of(label).and_then(|i| self.uncertainty.get(i)).copied()
    }

    /// Correlation matrix element (i, j). Returns `None` when out of range.
    pub fn correlation(&self, i: usize, j: usize) -> Option<f64> {
        self.correlations.get(i).and_then(|row| row.get(j)).copied()
    }

    /// Check that the parallel arrays are consistent.
    pub fn validate(&self) -> crate::Result<()> {
        let n = self.labels.len();
        if self.bestfit.len() != n || self.uncertainty.len() != n {
            return Err(crate::Error::Validation(format!(
                "fit result arrays length mismatch: labels={} bestfit={} uncertainty={}",
                n,
                self.bestfit.len(),
                self.uncertainty.len()
            )));
        }
        if !self.correlations.is_empty()
            && (self.correlations.len() != n || self.correlations.iter().any(|r| r.len() != n))
        {
            return Err(crate::Error::Validation(format!(
                "correlation matrix is not {n}x{n}"
            )));
        }
        Ok(())
    }
}

/// Best-fit nuisance-parameter values, a label-indexed subset view of
/// [`FitResults`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NuisanceParameters {
    /// Best-fit values
    pub bestfit: Vec<f64>,
    /// Parameter names
    pub labels: Vec<String>,
}

impl NuisanceParameters {
    /// Best-fit value for a named parameter.
    pub fn bestfit_for(&self, label: &str) -> Option<f64> {
        self.labels.iter().position(|l| l == label).and_then(|i| self.bestfit.get(i)).copied()
    }
}

impl From<&FitResults> for NuisanceParameters {
    fn from(fit: &FitResults) -> Self {
        Self { bestfit: fit.bestfit.clone(), labels: fit.labels.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit() -> FitResults {
        FitResults {
            bestfit: vec![1.2, 0.8],
            uncertainty: vec![0.1, 0.2],
            correlations: vec![vec![1.0, -0.3], vec![-0.3, 1.0]],
            labels: vec!["mu".to_string(), "alpha_sys1".to_string()],
        }
    }

    #[test]
    fn lookup_by_label() {
        let f = fit();
        assert_eq!(f.bestfit_for("mu"), Some(1.2));
        assert_eq!(f.bestfit_for("alpha_sys1"), Some(0.8));
        assert_eq!(f.bestfit_for("missing"), None);
        assert_eq!(f.uncertainty_for("alpha_sys1"), Some(0.2));
        assert_eq!(f.correlation(0, 1), Some(-0.3));
        assert_eq!(f.correlation(2, 0), None);
    }

    #[test]
    fn validate_catches_length_mismatch() {
        let mut f = fit();
        f.bestfit.pop();
        assert!(f.validate().is_err());
    }

    #[test]
    fn nuisance_view() {
        let nps = NuisanceParameters::from(&fit());
        assert_eq!(nps.bestfit_for("mu"), Some(1.2));
    }
}
