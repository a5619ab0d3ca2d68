//! Static configuration records, read from RON.

use deps::*;

use std::{collections::BTreeMap, path::Path};

use eyre::WrapErr;

use crate::{
    error::{FormationError, FormationResult},
    mind::{actor::EnemyConfig, formation::FormationConfig, spawner::SpawnerConfig},
    path::PathTemplate,
    SmartString,
};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(crate = "serde")]
#[serde(default)]
pub struct PoolConfig {
    pub capacity_per_template: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity_per_template: 8,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(crate = "serde")]
#[serde(default)]
pub struct GameConfig {
    pub formation: FormationConfig,
    pub paths: Vec<PathTemplate>,
    pub pool: PoolConfig,
    pub enemies: Vec<EnemyConfig>,
    pub spawner: SpawnerConfig,
}

impl GameConfig {
    pub fn load(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("unable to read config at {}", path.display()))?;
        Self::from_ron_str(&src).wrap_err_with(|| format!("bad config at {}", path.display()))
    }

    pub fn from_ron_str(src: &str) -> eyre::Result<Self> {
        let config: Self = ron::from_str(src).wrap_err("unable to parse config")?;
        Ok(config)
    }

    /// Everything that must hold before a formation may start.
    pub fn validate(&self) -> FormationResult<()> {
        self.formation.validate()?;
        if self.pool.capacity_per_template == 0 {
            return Err(FormationError::InvalidValue {
                name: "capacity_per_template",
                value: 0.,
                expected: "[1, inf)",
            });
        }

        // name -> looped
        let mut paths: BTreeMap<&SmartString, bool> = BTreeMap::new();
        for template in &self.paths {
            template.validate()?;
            if paths.insert(&template.name, template.looped).is_some() {
                return Err(FormationError::DuplicatePathTemplate(template.name.clone()));
            }
        }
        // dive and entry paths have to end or their actor never moves on
        let finite_path = |name: &SmartString, role: &'static str| match paths.get(name) {
            None => Err(FormationError::UnknownPathTemplate(name.clone())),
            Some(true) => Err(FormationError::LoopedPath {
                name: name.clone(),
                role,
            }),
            Some(false) => Ok(()),
        };
        for name in &self.formation.dive_paths {
            finite_path(name, "dive")?;
        }
        for name in self.spawner.entry_path_names() {
            finite_path(name, "entry")?;
        }

        for enemy in &self.enemies {
            enemy.validate()?;
        }
        self.spawner.validate()?;
        for wave in &self.spawner.waves {
            for name in &wave.enemies {
                if !self.enemies.iter().any(|enemy| &enemy.name == name) {
                    return Err(FormationError::UnknownEnemyKind(name.clone()));
                }
            }
        }

        let members = self.spawner.total_members();
        let slots = self.formation.layout.offsets().len();
        if members > slots {
            return Err(FormationError::TooManyMembers { members, slots });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mind::formation::{dive::DivingStrategy, slots::SlotLayout};

    const DEMO: &str = include_str!("../assets/config/galacron.ron");

    #[test]
    fn demo_config_is_valid() {
        let config = GameConfig::from_ron_str(DEMO).unwrap();
        config.validate().unwrap();
        assert!(!config.formation.dive_paths.is_empty());
        assert!(config.spawner.total_members() > 0);
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let config = GameConfig::from_ron_str(
            r#"(
                formation: (
                    layout: Offsets([(-1.0, 0.0), (0.0, 0.0), (1.0, 0.0)]),
                    dive_paths: ["swoop"],
                ),
                paths: [(name: "swoop", points: [(position: (0.0, 0.0)), (position: (0.0, -4.0))])],
            )"#,
        )
        .unwrap();
        assert_eq!(config.formation.spacing, 1.);
        assert_eq!(config.formation.diving, DivingStrategy::default());
        assert_eq!(config.paths[0].line_density, 10);
        assert_eq!(config.paths[0].points[1].speed_multiplier, 1.);
        assert_eq!(config.pool.capacity_per_template, 8);
        config.validate().unwrap();
    }

    #[test]
    fn unknown_references_are_fatal() {
        let mut config = GameConfig::from_ron_str(DEMO).unwrap();
        config.formation.dive_paths.push("nowhere".into());
        assert_eq!(
            config.validate(),
            Err(FormationError::UnknownPathTemplate("nowhere".into()))
        );

        let mut config = GameConfig::from_ron_str(DEMO).unwrap();
        config.spawner.waves[0].enemies.push("ghost".into());
        assert_eq!(
            config.validate(),
            Err(FormationError::UnknownEnemyKind("ghost".into()))
        );
    }

    #[test]
    fn looping_dive_or_entry_paths_are_fatal() {
        let mut config = GameConfig::from_ron_str(DEMO).unwrap();
        let dive = config.formation.dive_paths[0].clone();
        for template in config.paths.iter_mut().filter(|t| t.name == dive) {
            template.looped = true;
        }
        assert_eq!(
            config.validate(),
            Err(FormationError::LoopedPath {
                name: dive,
                role: "dive"
            })
        );

        let mut config = GameConfig::from_ron_str(DEMO).unwrap();
        let entry = config.spawner.waves[0].entry_paths[0].clone();
        for template in config.paths.iter_mut().filter(|t| t.name == entry) {
            template.looped = true;
        }
        assert_eq!(
            config.validate(),
            Err(FormationError::LoopedPath {
                name: entry,
                role: "entry"
            })
        );
    }

    #[test]
    fn more_enemies_than_slots_is_fatal() {
        let mut config = GameConfig::from_ron_str(DEMO).unwrap();
        config.formation.layout = SlotLayout::Offsets(vec![(0., 0.)]);
        assert!(matches!(
            config.validate(),
            Err(FormationError::TooManyMembers { slots: 1, .. })
        ));
    }

    #[test]
    fn garbage_is_an_error_not_a_panic() {
        assert!(GameConfig::from_ron_str("(formation: 12)").is_err());
    }
}
