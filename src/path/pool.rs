//! Reusable path instances.
//!
//! Handles are generational: releasing a handle bumps its slot's generation
//! so a stale copy can't release or read the slot's next tenant.

use deps::*;

use bevy::utils::HashMap;

use crate::{
    error::{FormationError, FormationResult, PoolError},
    math::*,
    SmartString,
};

use super::{Path, PathResource, PathTemplate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathHandle {
    category: u32,
    index: u32,
    generation: u32,
}

pub trait PathPool: Send + Sync {
    /// Instantiates a path of `category` at the given placement, or `None`
    /// when the category is unknown or exhausted.
    fn acquire(&mut self, category: &str, position: TVec2, rotation: TReal) -> Option<PathHandle>;
    fn release(&mut self, handle: PathHandle) -> Result<(), PoolError>;
    fn get(&self, handle: PathHandle) -> Option<&dyn PathResource>;
    fn available(&self, category: &str) -> usize;
    fn has_category(&self, category: &str) -> bool;
    /// `None` for unknown categories.
    fn is_looped(&self, category: &str) -> Option<bool>;
    /// Instances currently handed out across all categories.
    fn in_use(&self) -> usize;
}

/// Releases a handle, logging instead of failing on misuse.
pub fn release_quietly(pool: &mut dyn PathPool, handle: PathHandle) {
    if let Err(err) = pool.release(handle) {
        tracing::warn!(%err, "ignoring path release");
    }
}

/// The pool every system draws paths from.
pub struct Paths(Box<dyn PathPool>);

impl Paths {
    pub fn new(pool: Box<dyn PathPool>) -> Self {
        Self(pool)
    }

    #[inline]
    pub fn pool(&self) -> &dyn PathPool {
        self.0.as_ref()
    }

    #[inline]
    pub fn pool_mut(&mut self) -> &mut dyn PathPool {
        self.0.as_mut()
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self(Box::new(PrewarmedPathPool::default()))
    }
}

#[derive(Debug)]
struct PooledPath {
    path: Path,
    generation: u32,
    in_use: bool,
}

#[derive(Debug)]
struct Category {
    template: PathTemplate,
    slots: Vec<PooledPath>,
    free: Vec<u32>,
}

/// Bakes `capacity_per_template` instances of every template up front.
#[derive(Debug, Default)]
pub struct PrewarmedPathPool {
    categories: Vec<Category>,
    by_name: HashMap<SmartString, u32>,
}

impl PrewarmedPathPool {
    pub fn new(templates: &[PathTemplate], capacity_per_template: usize) -> FormationResult<Self> {
        let mut categories = Vec::with_capacity(templates.len());
        let mut by_name = HashMap::default();
        for template in templates {
            let idx = categories.len() as u32;
            if by_name.insert(template.name.clone(), idx).is_some() {
                return Err(FormationError::DuplicatePathTemplate(template.name.clone()));
            }
            let prototype = Path::bake(template, &Placement::default())?;
            let slots = (0..capacity_per_template)
                .map(|_| PooledPath {
                    path: prototype.clone(),
                    generation: 0,
                    in_use: false,
                })
                .collect();
            categories.push(Category {
                template: template.clone(),
                slots,
                // popped from the back, so lower indices go out first
                free: (0..capacity_per_template as u32).rev().collect(),
            });
        }
        tracing::debug!(
            templates = templates.len(),
            capacity_per_template,
            "path pool prewarmed"
        );
        Ok(Self {
            categories,
            by_name,
        })
    }

    fn slot(&self, handle: PathHandle) -> Option<&PooledPath> {
        self.categories
            .get(handle.category as usize)?
            .slots
            .get(handle.index as usize)
            .filter(|slot| slot.in_use && slot.generation == handle.generation)
    }
}

impl PathPool for PrewarmedPathPool {
    fn acquire(&mut self, category: &str, position: TVec2, rotation: TReal) -> Option<PathHandle> {
        let cat_idx = *self.by_name.get(category)?;
        let category = &mut self.categories[cat_idx as usize];
        let index = category.free.pop()?;
        let slot = &mut category.slots[index as usize];
        // templates were validated when the pool was built
        match Path::bake(&category.template, &Placement::new(position, rotation)) {
            Ok(path) => slot.path = path,
            Err(err) => {
                tracing::error!(%err, "unable to place pooled path");
                category.free.push(index);
                return None;
            }
        }
        slot.in_use = true;
        Some(PathHandle {
            category: cat_idx,
            index,
            generation: slot.generation,
        })
    }

    fn release(&mut self, handle: PathHandle) -> Result<(), PoolError> {
        let category = self
            .categories
            .get_mut(handle.category as usize)
            .ok_or(PoolError::ForeignHandle(handle))?;
        let slot = category
            .slots
            .get_mut(handle.index as usize)
            .ok_or(PoolError::ForeignHandle(handle))?;
        if !slot.in_use || slot.generation != handle.generation {
            return Err(PoolError::StaleHandle(handle));
        }
        slot.in_use = false;
        slot.generation = slot.generation.wrapping_add(1);
        category.free.push(handle.index);
        Ok(())
    }

    fn get(&self, handle: PathHandle) -> Option<&dyn PathResource> {
        self.slot(handle).map(|slot| &slot.path as &dyn PathResource)
    }

    fn available(&self, category: &str) -> usize {
        self.by_name
            .get(category)
            .map(|idx| self.categories[*idx as usize].free.len())
            .unwrap_or(0)
    }

    fn has_category(&self, category: &str) -> bool {
        self.by_name.contains_key(category)
    }

    fn is_looped(&self, category: &str) -> Option<bool> {
        self.by_name
            .get(category)
            .map(|idx| self.categories[*idx as usize].template.looped)
    }

    fn in_use(&self) -> usize {
        self.categories
            .iter()
            .map(|cat| cat.slots.len() - cat.free.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathPoint;

    fn pool(capacity: usize) -> PrewarmedPathPool {
        PrewarmedPathPool::new(
            &[
                PathTemplate::linear("swoop", vec![PathPoint::new(0., 0.), PathPoint::new(0., -3.)]),
                PathTemplate::linear("loop", vec![PathPoint::new(0., 0.), PathPoint::new(1., 0.)])
                    .looped(true),
            ],
            capacity,
        )
        .unwrap()
    }

    #[test]
    fn acquired_paths_are_placed() {
        let mut pool = pool(2);
        let handle = pool.acquire("swoop", TVec2::new(5., 5.), 0.).unwrap();
        let path = pool.get(handle).unwrap();
        assert_eq!(path.point_at_distance(0.), TVec2::new(5., 5.));
        assert_eq!(path.point_at_distance(3.), TVec2::new(5., 2.));
        assert_eq!(pool.available("swoop"), 1);
        assert_eq!(pool.available("loop"), 2);
    }

    #[test]
    fn exhaustion_and_unknown_categories_yield_none() {
        let mut pool = pool(1);
        assert!(pool.acquire("swoop", TVec2::ZERO, 0.).is_some());
        assert!(pool.acquire("swoop", TVec2::ZERO, 0.).is_none());
        assert!(pool.acquire("nope", TVec2::ZERO, 0.).is_none());
        assert!(!pool.has_category("nope"));
    }

    #[test]
    fn reports_which_categories_loop() {
        let pool = pool(1);
        assert_eq!(pool.is_looped("loop"), Some(true));
        assert_eq!(pool.is_looped("swoop"), Some(false));
        assert_eq!(pool.is_looped("nope"), None);
    }

    #[test]
    fn stale_handles_are_rejected() {
        let mut pool = pool(1);
        let first = pool.acquire("loop", TVec2::ZERO, 0.).unwrap();
        assert_eq!(pool.release(first), Ok(()));
        assert_eq!(pool.release(first), Err(PoolError::StaleHandle(first)));
        let second = pool.acquire("loop", TVec2::ZERO, 0.).unwrap();
        assert_ne!(first, second);
        assert!(pool.get(first).is_none());
        assert!(pool.get(second).is_some());
        assert_eq!(pool.release(first), Err(PoolError::StaleHandle(first)));
        assert_eq!(pool.in_use(), 1);
    }

    #[test]
    fn foreign_handles_are_rejected() {
        let mut small = pool(1);
        let mut big = pool(4);
        let mut handle = None;
        for _ in 0..4 {
            handle = big.acquire("loop", TVec2::ZERO, 0.);
        }
        let handle = handle.unwrap();
        assert_eq!(small.release(handle), Err(PoolError::ForeignHandle(handle)));
    }

    #[test]
    fn duplicate_template_names_are_refused() {
        let template = PathTemplate::linear("twice", vec![PathPoint::new(0., 0.)]);
        let err = PrewarmedPathPool::new(&[template.clone(), template], 1).unwrap_err();
        assert_eq!(err, FormationError::DuplicatePathTemplate("twice".into()));
    }
}
