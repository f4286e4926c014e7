use crate::fee::{FeeSchedule, DEFAULT_MIN_WITHDRAWAL, DEFAULT_PLATFORM_FEE, DEFAULT_WITHDRAWAL_FEE};
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    #[serde(default)]
    pub fees: FeesConfig,
}

/// Fee rates at 10^6 precision, amounts in cents
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FeesConfig {
    pub platform_fee_rate: u64,
    pub withdrawal_fee_rate: u64,
    pub min_withdrawal: u64,
}

impl Default for FeesConfig {
    fn default() -> Self {
        Self {
            platform_fee_rate: DEFAULT_PLATFORM_FEE,
            withdrawal_fee_rate: DEFAULT_WITHDRAWAL_FEE,
            min_withdrawal: DEFAULT_MIN_WITHDRAWAL,
        }
    }
}

impl FeesConfig {
    pub fn schedule(&self) -> FeeSchedule {
        FeeSchedule {
            platform_fee_rate: self.platform_fee_rate,
            withdrawal_fee_rate: self.withdrawal_fee_rate,
            min_withdrawal: self.min_withdrawal,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Self {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .unwrap_or_else(|_| panic!("Failed to read config file: {}", config_path));
        serde_yaml::from_str(&content).expect("Failed to parse config yaml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fees_default_when_section_missing() {
        let yaml = r#"
log_level: "info"
log_dir: "./logs"
log_file: "crowdstake.log"
use_json: false
rotation: "daily"
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.fees.platform_fee_rate, DEFAULT_PLATFORM_FEE);
        assert_eq!(config.fees.schedule(), FeeSchedule::default());
    }

    #[test]
    fn test_fees_overridable() {
        let yaml = r#"
log_level: "debug"
log_dir: "./logs"
log_file: "crowdstake.log"
use_json: true
rotation: "hourly"
fees:
  platform_fee_rate: 30000
  withdrawal_fee_rate: 10000
  min_withdrawal: 2500
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        let schedule = config.fees.schedule();
        assert_eq!(schedule.platform_fee_rate, 30_000);
        assert_eq!(schedule.min_withdrawal, 25_00);
    }
}
