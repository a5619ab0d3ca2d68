use deps::*;

use rand::{Rng, RngCore};

use crate::{
    error::{check_range, FormationResult},
    math::*,
    mind::actor::ActorId,
};

/// Shot cadence and aim spread for one actor state.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(crate = "serde")]
#[serde(default)]
pub struct FireSettings {
    pub can_fire: bool,
    /// Seconds between shots, sampled uniformly from `[min, max]`.
    pub min_fire_rate: TReal,
    pub max_fire_rate: TReal,
    /// Aim jitter bound, sampled from `[min, max]` once per shot.
    pub min_precision: TReal,
    pub max_precision: TReal,
}

impl Default for FireSettings {
    fn default() -> Self {
        Self {
            can_fire: true,
            min_fire_rate: 0.5,
            max_fire_rate: 1.0,
            min_precision: 0.1,
            max_precision: 0.5,
        }
    }
}

impl FireSettings {
    pub fn silent() -> Self {
        Self {
            can_fire: false,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> FormationResult<()> {
        check_range("fire_rate", self.min_fire_rate, self.max_fire_rate)?;
        check_range("precision", self.min_precision, self.max_precision)?;
        Ok(())
    }

    pub fn sample_fire_rate(&self, rng: &mut dyn RngCore) -> TReal {
        rng.gen_range(self.min_fire_rate..=self.max_fire_rate)
    }

    pub fn sample_precision(&self, rng: &mut dyn RngCore) -> TReal {
        rng.gen_range(self.min_precision..=self.max_precision)
    }

    /// Per-axis jitter for a unit aim direction. One precision is drawn per
    /// shot and both axes are uniform within it.
    pub fn sample_aim_offset(&self, rng: &mut dyn RngCore) -> TVec2 {
        let precision = self.sample_precision(rng);
        TVec2::new(
            rng.gen_range(-precision..=precision),
            rng.gen_range(-precision..=precision),
        )
    }

    /// Unit shot direction from `origin` at `target`, jittered by precision.
    pub fn aim(&self, origin: TVec2, target: TVec2, rng: &mut dyn RngCore) -> TVec2 {
        let straight = (target - origin).try_normalize().unwrap_or(TVec2::new(0., -1.));
        (straight + self.sample_aim_offset(rng))
            .try_normalize()
            .unwrap_or(straight)
    }
}

/// Per-state fire settings of an enemy kind.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(crate = "serde")]
#[serde(default)]
pub struct FireProfiles {
    pub on_path: FireSettings,
    pub fly_in: FireSettings,
    pub idle: FireSettings,
    pub dive: FireSettings,
}

impl Default for FireProfiles {
    fn default() -> Self {
        Self {
            on_path: FireSettings::silent(),
            fly_in: FireSettings::silent(),
            idle: FireSettings {
                min_fire_rate: 2.,
                max_fire_rate: 4.,
                ..Default::default()
            },
            dive: FireSettings::default(),
        }
    }
}

impl FireProfiles {
    pub fn validate(&self) -> FormationResult<()> {
        self.on_path.validate()?;
        self.fly_in.validate()?;
        self.idle.validate()?;
        self.dive.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shot {
    pub shooter: ActorId,
    pub origin: TVec2,
    /// Unit length.
    pub direction: TVec2,
}

/// One cooldown per actor, shared across its states.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FireControl {
    cooldown: TReal,
}

impl FireControl {
    pub fn cooldown(&self) -> TReal {
        self.cooldown
    }

    pub fn update(
        &mut self,
        settings: &FireSettings,
        shooter: ActorId,
        origin: TVec2,
        target: Option<TVec2>,
        dt: TReal,
        rng: &mut dyn RngCore,
    ) -> Option<Shot> {
        self.cooldown -= dt;
        if !settings.can_fire || self.cooldown > 0. {
            return None;
        }
        let target = target?;
        let direction = settings.aim(origin, target, rng);
        self.cooldown = settings.sample_fire_rate(rng);
        Some(Shot {
            shooter,
            origin,
            direction,
        })
    }
}
