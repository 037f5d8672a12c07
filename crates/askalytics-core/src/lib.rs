pub mod classifier;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod extractor;
mod matching;
pub mod synthesizer;
pub mod vocabulary;

pub use classifier::classify;
pub use compiler::{compile, CompileError, CompilerLimits};
pub use config::{
    AppConfig, DefaultsConfig, Ga4Config, MainConfig, RoutingConfig, WarehouseConfig,
};
pub use engine::AnalyticsEngine;
pub use extractor::extract;
pub use synthesizer::synthesize;
