pub mod analysis;
pub mod classify;
pub mod curve;
pub mod domain;
pub mod marginal;
pub mod numeric;
pub mod quality;
pub mod scenario;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub sentry_dsn: Option<String>,
        pub port: Option<u16>,
        pub default_target_cpa: Option<f64>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let port = match std::env::var("PORT") {
                Ok(v) => Some(v.parse::<u16>().with_context(|| format!("PORT is not a valid port: {v}"))?),
                Err(_) => None,
            };

            let default_target_cpa = match std::env::var("DEFAULT_TARGET_CPA") {
                Ok(v) => {
                    let parsed = v
                        .parse::<f64>()
                        .with_context(|| format!("DEFAULT_TARGET_CPA is not a number: {v}"))?;
                    anyhow::ensure!(
                        parsed.is_finite() && parsed > 0.0,
                        "DEFAULT_TARGET_CPA must be positive (got {parsed})"
                    );
                    Some(parsed)
                }
                Err(_) => None,
            };

            Ok(Self {
                sentry_dsn: std::env::var("SENTRY_DSN").ok().filter(|s| !s.trim().is_empty()),
                port,
                default_target_cpa,
            })
        }

        pub fn port_or_default(&self) -> u16 {
            self.port.unwrap_or(3000)
        }

        pub fn target_cpa_or_default(&self) -> f64 {
            self.default_target_cpa
                .unwrap_or(crate::domain::contract::DEFAULT_TARGET_CPA)
        }
    }
}
