use std::ops::Range;
use std::path::Path;

use aleph_core::dag::max_tolerable_faulty;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::network::FaultConfig;

/// Parameters of one simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: u64,
    /// Number of participants, `N`.
    pub participants: usize,
    /// How many participants are byzantine; at most `(N - 1) / 3`.
    pub byzantine: usize,
    /// Simulation steps before the final full sync.
    pub steps: u64,
    /// Chance that a byzantine participant equivocates when it creates a node.
    pub equivocation_percent: u8,
    /// Random peers each participant re-sends its latest node to per step.
    pub gossip_fanout: usize,
    pub fault: FaultConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            participants: 4,
            byzantine: 1,
            steps: 24,
            equivocation_percent: 30,
            gossip_fanout: 1,
            fault: FaultConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Reject parameters the protocol cannot tolerate.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no participants, more byzantine
    /// participants than `(N - 1) / 3`, or no steps.
    pub fn validate(&self) -> Result<()> {
        if self.participants == 0 {
            bail!("participants must be > 0");
        }
        let tolerated = max_tolerable_faulty(self.participants);
        if self.byzantine > tolerated {
            bail!(
                "byzantine must be <= {tolerated} for {} participants (got {})",
                self.participants,
                self.byzantine
            );
        }
        if self.steps == 0 {
            bail!("steps must be > 0");
        }
        Ok(())
    }
}

/// Seeds to run and the per-seed simulation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    /// Range of seeds to execute, e.g. `0..100`.
    pub seed_range: Range<u64>,
    /// Template for every seed; its own `seed` field is ignored.
    pub simulation: SimulationConfig,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            seed_range: 0..100,
            simulation: SimulationConfig::default(),
        }
    }
}

impl CampaignConfig {
    /// Simulation parameters for `seed`.
    #[must_use]
    pub fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            ..self.simulation.clone()
        }
    }

    /// # Errors
    ///
    /// Returns an error if the seed range is empty or the simulation template
    /// is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        self.simulation.validate()
    }
}

/// Load a [`SimulationConfig`] from TOML. A missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file cannot be read, does not parse, or holds
/// invalid parameters.
pub fn load_simulation_config(path: &Path) -> Result<SimulationConfig> {
    let config: SimulationConfig = load_or_default(path)?;
    config
        .validate()
        .with_context(|| format!("Invalid simulation config {}", path.display()))?;
    Ok(config)
}

/// Load a [`CampaignConfig`] from TOML. A missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file cannot be read, does not parse, or holds
/// invalid parameters.
pub fn load_campaign_config(path: &Path) -> Result<CampaignConfig> {
    let config: CampaignConfig = load_or_default(path)?;
    config
        .validate()
        .with_context(|| format!("Invalid campaign config {}", path.display()))?;
    Ok(config)
}

fn load_or_default<T>(path: &Path) -> Result<T>
where
    T: Default + for<'de> Deserialize<'de>,
{
    if !path.exists() {
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<T>(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(SimulationConfig::default().validate().is_ok());
        assert!(CampaignConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_participants_rejected() {
        let config = SimulationConfig {
            participants: 0,
            byzantine: 0,
            ..SimulationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn too_many_byzantine_rejected() {
        let config = SimulationConfig {
            participants: 6,
            byzantine: 2,
            ..SimulationConfig::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("byzantine must be <= 1"), "{err}");

        let ok = SimulationConfig {
            participants: 7,
            byzantine: 2,
            ..SimulationConfig::default()
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn zero_steps_rejected() {
        let config = SimulationConfig {
            steps: 0,
            ..SimulationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_seed_range_rejected() {
        let config = CampaignConfig {
            seed_range: 5..5,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn sim_config_for_seed_overrides_seed_only() {
        let config = CampaignConfig::default();
        let sim = config.sim_config_for_seed(42);
        assert_eq!(sim.seed, 42);
        assert_eq!(sim.participants, config.simulation.participants);
        assert_eq!(sim.fault, config.simulation.fault);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: SimulationConfig = toml::from_str("participants = 7\n[fault]\ndrop_rate_percent = 0\n").unwrap();
        assert_eq!(config.participants, 7);
        assert_eq!(config.steps, SimulationConfig::default().steps);
        assert_eq!(config.fault.drop_rate_percent, 0);
        assert_eq!(config.fault.max_delay_steps, FaultConfig::default().max_delay_steps);
    }
}
