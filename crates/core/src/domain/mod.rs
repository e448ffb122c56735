pub mod contract;
pub mod model;
pub mod recommendation;
pub mod series;
pub mod snapshot;
pub mod zone;

pub use model::{FittedModel, ModelParams};
pub use recommendation::{ProjectedSummary, ScenarioPlan, ScenarioRecommendation};
pub use series::{HistoricalSeries, Observation};
pub use snapshot::{ChannelSnapshot, EntityType, TargetOverride};
pub use zone::{ConfidenceTier, DataQualityState, ScenarioAction, TargetSource, TrafficLight};
