//! Built-in components wired onto players by the default factory.

use crate::entity::{Component, Entity, GameContext, Phase};

/// Attributes a client may never overwrite through reported state.
pub const PROTECTED_ATTRS: &[&str] = &["id", "clientId"];

/// Applies state reported by the owning client.
///
/// Reported state is queued on receipt and applied here, at the start of the
/// next tick, oldest first.
#[derive(Debug, Default)]
pub struct StateIngest;

impl StateIngest {
    pub const KEY: &'static str = "state_ingest";
}

impl Component for StateIngest {
    fn key(&self) -> &str {
        Self::KEY
    }

    fn phase(&self) -> Phase {
        Phase::INPUT
    }

    fn update(&mut self, owner: &mut Entity, _game: &GameContext) -> anyhow::Result<()> {
        for mut state in owner.drain_state() {
            for key in PROTECTED_ATTRS {
                state.remove(*key);
            }
            owner.sync(state);
        }
        Ok(())
    }
}

/// Keeps the entity's footprint inside the playable area.
#[derive(Debug, Default)]
pub struct ClampToBounds;

impl ClampToBounds {
    pub const KEY: &'static str = "clamp_to_bounds";
}

impl Component for ClampToBounds {
    fn key(&self) -> &str {
        Self::KEY
    }

    fn phase(&self) -> Phase {
        Phase::PHYSICS
    }

    fn update(&mut self, owner: &mut Entity, game: &GameContext) -> anyhow::Result<()> {
        let width = owner.get_f64("width").unwrap_or(0.0);
        let height = owner.get_f64("height").unwrap_or(0.0);

        if let Some(x) = owner.get_f64("x") {
            owner.set_attr("x", clamp_axis(x, game.width - width));
        }
        if let Some(y) = owner.get_f64("y") {
            owner.set_attr("y", clamp_axis(y, game.height - height));
        }
        Ok(())
    }
}

fn clamp_axis(v: f64, max: f64) -> f64 {
    v.clamp(0.0, max.max(0.0))
}
