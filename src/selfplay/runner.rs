//! The self-play loop.
//!
//! Each episode starts a fresh game with seed `seed_offset + episode`,
//! then lets the active seat's strategy pick from the enumerated calls
//! until victory, a dead end, or `max_steps`.
//!
//! ## Episode endings
//!
//! | ending | counted as |
//! |---|---|
//! | victory rule matches | win, loss or tie |
//! | no candidates, or strategy passes | tie + `no_action` |
//! | strategy error, enumeration or victory defect | `violations` |
//! | step rejected | tie |
//! | `max_steps` reached while ongoing | tie |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::strategy::{StrategyContext, StrategyError, StrategyTable};
use crate::compiler::spec::CompiledSpec;
use crate::core::action::Event;
use crate::core::error::{EvalError, InitError};
use crate::core::state::GameState;
use crate::core::SeatId;
use crate::engine::{evaluate_victory, init, step, InitInput, VictoryResult};
use crate::legal::{legal_actions, EnumerateOptions};

/// Self-play configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelfPlayConfig {
    pub episodes: usize,

    /// Steps allowed per episode before it is called a tie.
    pub max_steps: usize,

    pub seats: Vec<SeatId>,

    /// Added to the episode index to form the init seed.
    pub seed_offset: u64,

    /// Keep the event list of every episode.
    pub collect_trajectory: bool,

    pub enumerate: EnumerateOptions,
}

impl Default for SelfPlayConfig {
    fn default() -> Self {
        Self {
            episodes: 1,
            max_steps: 100,
            seats: vec!["A".to_string(), "B".to_string()],
            seed_offset: 0,
            collect_trajectory: false,
            enumerate: EnumerateOptions::default(),
        }
    }
}

impl SelfPlayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_episodes(mut self, episodes: usize) -> Self {
        self.episodes = episodes;
        self
    }

    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    #[must_use]
    pub fn with_seats<I, S>(mut self, seats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SeatId>,
    {
        self.seats = seats.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_seed_offset(mut self, offset: u64) -> Self {
        self.seed_offset = offset;
        self
    }

    #[must_use]
    pub fn with_trajectory(mut self, collect: bool) -> Self {
        self.collect_trajectory = collect;
        self
    }

    #[must_use]
    pub fn with_enumerate(mut self, options: EnumerateOptions) -> Self {
        self.enumerate = options;
        self
    }
}

/// Aggregate statistics of a self-play run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SelfPlaySummary {
    pub episodes: usize,
    /// Steps applied across all episodes.
    pub steps: usize,
    pub ties: usize,
    pub wins: usize,
    pub losses: usize,
    pub no_action: usize,
    pub violations: usize,
    /// Applied steps per action id.
    pub action_hits: BTreeMap<String, usize>,
    /// Matches per victory branch key.
    pub branch_hits: BTreeMap<String, usize>,
    pub episode_steps: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trajectories: Option<Vec<Vec<Event>>>,
}

impl SelfPlaySummary {
    /// Evaluate victory, recording the matching branch.
    fn judge(&mut self, spec: &CompiledSpec, state: &GameState) -> Result<Option<VictoryResult>, EvalError> {
        let outcome = evaluate_victory(spec, state)?;
        if let Some(branch) = outcome.branch {
            *self.branch_hits.entry(branch).or_default() += 1;
        }
        Ok(outcome.result.is_terminal().then_some(outcome.result))
    }

    fn record(&mut self, episode: Episode) {
        match episode.end {
            EpisodeEnd::Decided(VictoryResult::Win) => self.wins += 1,
            EpisodeEnd::Decided(VictoryResult::Loss) => self.losses += 1,
            EpisodeEnd::Decided(_) | EpisodeEnd::Rejected | EpisodeEnd::OutOfSteps => self.ties += 1,
            EpisodeEnd::NoAction => {
                self.ties += 1;
                self.no_action += 1;
            }
            EpisodeEnd::Violation => self.violations += 1,
        }
        self.episode_steps.push(episode.steps);
        if let Some(trajectories) = &mut self.trajectories {
            trajectories.push(episode.events);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EpisodeEnd {
    Decided(VictoryResult),
    NoAction,
    Violation,
    Rejected,
    OutOfSteps,
}

#[derive(Debug)]
struct Episode {
    steps: usize,
    end: EpisodeEnd,
    events: Vec<Event>,
}

impl Episode {
    fn ended(mut self, end: EpisodeEnd) -> Self {
        self.end = end;
        self
    }
}

/// Run `config.episodes` games and summarize them.
///
/// Fails only when a game cannot be started.
pub fn self_play(
    spec: &CompiledSpec,
    config: &SelfPlayConfig,
    strategies: &mut StrategyTable,
) -> Result<SelfPlaySummary, InitError> {
    let mut summary = SelfPlaySummary {
        episodes: config.episodes,
        trajectories: config.collect_trajectory.then(Vec::new),
        ..SelfPlaySummary::default()
    };

    for index in 0..config.episodes {
        let seed = config.seed_offset.wrapping_add(index as u64);
        let start = init(spec, &InitInput::new(config.seats.iter().cloned(), seed))?;
        let episode = play_episode(spec, start.game_state, config, strategies, &mut summary);
        debug!(episode = index, seed, steps = episode.steps, end = ?episode.end, "episode finished");
        summary.record(episode);
    }

    info!(
        spec_id = %spec.spec_id,
        episodes = summary.episodes,
        steps = summary.steps,
        wins = summary.wins,
        losses = summary.losses,
        ties = summary.ties,
        no_action = summary.no_action,
        violations = summary.violations,
        "self-play finished"
    );
    Ok(summary)
}

fn play_episode(
    spec: &CompiledSpec,
    mut state: GameState,
    config: &SelfPlayConfig,
    strategies: &mut StrategyTable,
    summary: &mut SelfPlaySummary,
) -> Episode {
    let episode = Episode {
        steps: 0,
        end: EpisodeEnd::OutOfSteps,
        events: Vec::new(),
    };
    let mut episode = match summary.judge(spec, &state) {
        Ok(None) => episode,
        Ok(Some(result)) => return episode.ended(EpisodeEnd::Decided(result)),
        Err(err) => {
            warn!(error = %err, "victory evaluation failed");
            return episode.ended(EpisodeEnd::Violation);
        }
    };

    while episode.steps < config.max_steps {
        let seat = state.active_seat.clone().unwrap_or_default();
        let calls = match legal_actions(spec, &state, &seat, &config.enumerate) {
            Ok(calls) => calls,
            Err(err) => {
                warn!(%seat, error = %err, "enumeration failed");
                return episode.ended(EpisodeEnd::Violation);
            }
        };
        if calls.is_empty() {
            return episode.ended(EpisodeEnd::NoAction);
        }

        let ctx = StrategyContext { seat: &seat, state: &state };
        let strategy = strategies.for_seat(&seat);
        let choice = strategy.choose(&calls, &ctx).and_then(|choice| match choice {
            Some(call) if !calls.contains(&call) => Err(StrategyError::NotOffered(call.action)),
            other => Ok(other),
        });
        let call = match choice {
            Ok(Some(call)) => call,
            Ok(None) => return episode.ended(EpisodeEnd::NoAction),
            Err(err) => {
                warn!(%seat, strategy = strategy.name(), error = %err, "strategy violation");
                return episode.ended(EpisodeEnd::Violation);
            }
        };

        let action = call.into_step(state.meta.last_seq + 1);
        match step(spec, &state, &action) {
            Ok(transition) => {
                *summary.action_hits.entry(action.id.clone()).or_default() += 1;
                summary.steps += 1;
                episode.steps += 1;
                if config.collect_trajectory {
                    episode.events.push(transition.event);
                }
                state = transition.next_state;
            }
            Err(err) => {
                debug!(action = %action.id, code = err.code(), "episode ended on a rejected step");
                return episode.ended(EpisodeEnd::Rejected);
            }
        }

        match summary.judge(spec, &state) {
            Ok(None) => {}
            Ok(Some(result)) => return episode.ended(EpisodeEnd::Decided(result)),
            Err(err) => {
                warn!(error = %err, "victory evaluation failed");
                return episode.ended(EpisodeEnd::Violation);
            }
        }
    }
    episode
}
