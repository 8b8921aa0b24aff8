//! Automated self-play for testing and balancing rule sets.
//!
//! ## Overview
//!
//! - **Strategy**: picks one call from the enumerated candidates
//! - **StrategyTable**: assigns strategies to seats
//! - **self_play**: runs episodes and aggregates a [`SelfPlaySummary`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rulekit::selfplay::{self_play, SelfPlayConfig, StrategyKind, StrategyTable};
//!
//! let config = SelfPlayConfig::new().with_episodes(100).with_seats(["A", "B"]);
//! let mut strategies = StrategyTable::uniform(StrategyKind::Random, &config.seats, 7);
//! let summary = self_play(&spec, &config, &mut strategies)?;
//! println!("{} wins over {} episodes", summary.wins, summary.episodes);
//! ```

pub mod runner;
pub mod strategy;

pub use runner::{self_play, SelfPlayConfig, SelfPlaySummary};
pub use strategy::{
    FirstStrategy, RandomStrategy, Strategy, StrategyContext, StrategyError, StrategyKind, StrategyTable,
};
