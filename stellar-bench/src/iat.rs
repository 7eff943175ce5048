//! Inter-arrival time generation.
//!
//! The schedule of a sub-experiment is a list of delays, one per scheduling tick, generated once
//! before the first burst and consumed by index.

use std::time::Duration;

use rand::Rng;
use rand_distr::{Distribution, Exp};

use crate::experiment::IatType;

/// Errors produced when the IAT parameters cannot generate a valid schedule.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum IatError {
    /// The nominal IAT is negative, NaN, infinite or too large for a delay.
    #[error("invalid IAT of {0} seconds")]
    InvalidIat(f64),

    /// The stochastic distribution is only defined for IATs above one second.
    #[error("stochastic IAT requires more than one second, got {0}")]
    StochasticTooSmall(f64),

    /// The step ramp start is negative, NaN, infinite or too large for a delay.
    #[error("invalid step start of {0} seconds")]
    InvalidStepStart(f64),
}

/// Parameters of an IAT schedule.
#[derive(Clone, Debug, PartialEq)]
pub struct IatSpec {
    /// Nominal delay between ticks, in seconds.
    pub iat_seconds: f64,
    /// Distribution of the delays.
    pub iat_type: IatType,
    /// First delay of a step ramp. Defaults to `iat_seconds`.
    pub step_start_seconds: Option<f64>,
}

impl IatSpec {
    /// Checks that the parameters produce finite, non-negative delays that fit a [`Duration`].
    pub fn validate(&self) -> Result<(), IatError> {
        if Duration::try_from_secs_f64(self.iat_seconds).is_err() {
            return Err(IatError::InvalidIat(self.iat_seconds));
        }

        match &self.iat_type {
            IatType::Stochastic | IatType::Unknown(_) if self.iat_seconds <= 1.0 => {
                Err(IatError::StochasticTooSmall(self.iat_seconds))
            }
            IatType::Step => match self.step_start_seconds {
                Some(start) if Duration::try_from_secs_f64(start).is_err() => {
                    Err(IatError::InvalidStepStart(start))
                }
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

/// Generates `bursts` delays for the given spec.
///
/// - *deterministic*: every delay equals `iat_seconds`.
/// - *stochastic*: `iat_seconds + Exp(1 / ln(iat_seconds))`, truncated to milliseconds. Every
///   delay is at least `iat_seconds`.
/// - *step*: starts at `step_start_seconds`, grows by one second per tick and plateaus at
///   `iat_seconds`.
///
/// Unknown types log a warning and generate a stochastic schedule.
pub fn generate<R: Rng + ?Sized>(
    bursts: usize,
    spec: &IatSpec,
    rng: &mut R,
) -> Result<Vec<Duration>, IatError> {
    spec.validate()?;

    let delays = match &spec.iat_type {
        IatType::Deterministic => {
            vec![Duration::from_secs_f64(spec.iat_seconds); bursts]
        }
        IatType::Stochastic => stochastic(bursts, spec.iat_seconds, rng)?,
        IatType::Step => step(bursts, spec),
        IatType::Unknown(name) => {
            tracing::warn!(iat_type = %name, "Unknown IAT type, falling back to stochastic");
            stochastic(bursts, spec.iat_seconds, rng)?
        }
    };

    tracing::debug!(bursts, ?delays, "Generated IAT schedule");
    Ok(delays)
}

fn stochastic<R: Rng + ?Sized>(
    bursts: usize,
    iat_seconds: f64,
    rng: &mut R,
) -> Result<Vec<Duration>, IatError> {
    let exp = Exp::new(1.0 / iat_seconds.ln())
        .map_err(|_| IatError::StochasticTooSmall(iat_seconds))?;

    let delays = (0..bursts)
        .map(|_| {
            let seconds = iat_seconds + exp.sample(rng);
            Duration::from_millis((seconds * 1000.0) as u64)
        })
        .collect();

    Ok(delays)
}

fn step(bursts: usize, spec: &IatSpec) -> Vec<Duration> {
    let plateau = Duration::from_secs_f64(spec.iat_seconds);
    let mut current = spec
        .step_start_seconds
        .map_or(plateau, Duration::from_secs_f64);

    (0..bursts)
        .map(|_| {
            let delay = current.min(plateau);
            current = current.saturating_add(Duration::from_secs(1));
            delay
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    fn spec(iat_seconds: f64, iat_type: IatType) -> IatSpec {
        IatSpec {
            iat_seconds,
            iat_type,
            step_start_seconds: None,
        }
    }

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(42)
    }

    #[test]
    fn deterministic_is_exact() {
        let delays = generate(10, &spec(2.5, IatType::Deterministic), &mut rng()).unwrap();

        assert_eq!(delays.len(), 10);
        assert!(delays.iter().all(|d| *d == Duration::from_millis(2500)));
    }

    #[test]
    fn stochastic_is_shifted_by_iat() {
        let delays = generate(1000, &spec(3.0, IatType::Stochastic), &mut rng()).unwrap();

        assert_eq!(delays.len(), 1000);
        assert!(delays.iter().all(|d| *d >= Duration::from_secs(3)));
        assert!(delays.iter().any(|d| *d > Duration::from_secs(3)));
    }

    #[test]
    fn stochastic_rejects_small_iat() {
        assert_eq!(
            generate(5, &spec(1.0, IatType::Stochastic), &mut rng()),
            Err(IatError::StochasticTooSmall(1.0))
        );
        assert_eq!(
            generate(5, &spec(0.5, IatType::Unknown("gamma".into())), &mut rng()),
            Err(IatError::StochasticTooSmall(0.5))
        );
    }

    #[test]
    fn rejects_non_finite_iat() {
        assert!(matches!(
            generate(5, &spec(f64::NAN, IatType::Deterministic), &mut rng()),
            Err(IatError::InvalidIat(_))
        ));
        assert_eq!(
            generate(5, &spec(-1.0, IatType::Step), &mut rng()),
            Err(IatError::InvalidIat(-1.0))
        );
    }

    #[test]
    fn rejects_iat_beyond_duration_range() {
        assert_eq!(
            generate(1, &spec(1e20, IatType::Deterministic), &mut rng()),
            Err(IatError::InvalidIat(1e20))
        );

        let spec = IatSpec {
            iat_seconds: 5.0,
            iat_type: IatType::Step,
            step_start_seconds: Some(1e20),
        };
        assert_eq!(
            generate(1, &spec, &mut rng()),
            Err(IatError::InvalidStepStart(1e20))
        );
    }

    #[test]
    fn unknown_type_falls_back_to_stochastic() {
        let delays = generate(50, &spec(2.0, IatType::Unknown("gamma".into())), &mut rng()).unwrap();

        assert_eq!(delays.len(), 50);
        assert!(delays.iter().all(|d| *d >= Duration::from_secs(2)));
    }

    #[test]
    fn step_without_start_is_constant() {
        let delays = generate(4, &spec(3.0, IatType::Step), &mut rng()).unwrap();
        assert_eq!(delays, vec![Duration::from_secs(3); 4]);
    }

    #[test]
    fn step_ramps_up_to_plateau() {
        let spec = IatSpec {
            iat_seconds: 4.0,
            iat_type: IatType::Step,
            step_start_seconds: Some(1.0),
        };

        let delays = generate(6, &spec, &mut rng()).unwrap();
        let seconds: Vec<_> = delays.iter().map(Duration::as_secs).collect();

        assert_eq!(seconds, [1, 2, 3, 4, 4, 4]);
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn zero_bursts_yield_empty_schedule() {
        let delays = generate(0, &spec(2.0, IatType::Deterministic), &mut rng()).unwrap();
        assert!(delays.is_empty());
    }
}
