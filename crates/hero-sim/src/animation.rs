//! Minimal clip player standing in for a host animator.
//!
//! Each layer plays at most one clip. Normalized time grows past 1.0 while a
//! looping clip repeats; a one-shot clip is dropped from its layer once it
//! reaches the end.

use ahash::AHashMap;
use hero_combat::prelude::{AnimationStateInfo, AnimationStateSource, AnimatorLookup};
use hero_common::EntityId;

/// A clip playing on one layer.
#[derive(Debug, Clone, PartialEq)]
struct PlayingClip {
    name: String,
    length: f32,
    elapsed: f32,
    looping: bool,
}

impl PlayingClip {
    fn normalized_time(&self) -> f32 {
        self.elapsed / self.length
    }
}

/// Layered clip player for one character.
#[derive(Debug, Clone)]
pub struct ClipAnimator {
    layers: Vec<Option<PlayingClip>>,
}

impl ClipAnimator {
    /// Creates an animator with `layer_count` empty layers.
    #[must_use]
    pub fn new(layer_count: usize) -> Self {
        Self {
            layers: vec![None; layer_count],
        }
    }

    /// Starts `name` from the beginning on `layer`, growing the layer list if needed.
    pub fn play(&mut self, layer: usize, name: &str, length: f32, looping: bool) {
        if layer >= self.layers.len() {
            self.layers.resize(layer + 1, None);
        }
        self.layers[layer] = Some(PlayingClip {
            name: name.to_string(),
            length: length.max(f32::EPSILON),
            elapsed: 0.0,
            looping,
        });
    }

    /// Stops every layer.
    pub fn stop_all(&mut self) {
        self.layers.iter_mut().for_each(|slot| *slot = None);
    }

    /// Whether `name` is the active clip on `layer`.
    #[must_use]
    pub fn is_playing(&self, layer: usize, name: &str) -> bool {
        self.layers
            .get(layer)
            .and_then(Option::as_ref)
            .is_some_and(|clip| clip.name == name)
    }

    /// Normalized time of the clip on `layer`, if one plays.
    #[must_use]
    pub fn normalized_time(&self, layer: usize) -> Option<f32> {
        self.layers
            .get(layer)
            .and_then(Option::as_ref)
            .map(PlayingClip::normalized_time)
    }

    /// Advances every layer by `dt`.
    ///
    /// Returns the names of one-shot clips that finished during this step.
    pub fn advance(&mut self, dt: f32) -> Vec<String> {
        let mut finished = Vec::new();
        for slot in &mut self.layers {
            let Some(clip) = slot else {
                continue;
            };
            clip.elapsed += dt;
            if !clip.looping && clip.elapsed >= clip.length {
                if let Some(done) = slot.take() {
                    finished.push(done.name);
                }
            }
        }
        finished
    }
}

impl AnimationStateSource for ClipAnimator {
    fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn current_state(&self, layer: usize) -> Option<AnimationStateInfo<'_>> {
        let clip = self.layers.get(layer)?.as_ref()?;
        Some(AnimationStateInfo {
            name: &clip.name,
            normalized_time: clip.normalized_time(),
            looping: clip.looping,
        })
    }
}

/// Animators of every character in the scene.
#[derive(Debug, Default)]
pub struct AnimatorBank {
    animators: AHashMap<EntityId, ClipAnimator>,
}

impl AnimatorBank {
    /// Creates an empty bank.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gives `entity` an animator with `layer_count` layers.
    pub fn insert(&mut self, entity: EntityId, layer_count: usize) {
        self.animators.insert(entity, ClipAnimator::new(layer_count));
    }

    /// Animator of `entity`.
    #[must_use]
    pub fn get(&self, entity: EntityId) -> Option<&ClipAnimator> {
        self.animators.get(&entity)
    }

    /// Mutable animator of `entity`.
    pub fn get_mut(&mut self, entity: EntityId) -> Option<&mut ClipAnimator> {
        self.animators.get_mut(&entity)
    }

    /// Advances all animators, returning finished one-shot clips per entity.
    pub fn advance(&mut self, dt: f32) -> Vec<(EntityId, String)> {
        let mut finished = Vec::new();
        for (id, animator) in &mut self.animators {
            finished.extend(animator.advance(dt).into_iter().map(|name| (*id, name)));
        }
        finished
    }
}

impl AnimatorLookup for AnimatorBank {
    fn animator(&self, entity: EntityId) -> Option<&dyn AnimationStateSource> {
        self.animators.get(&entity).map(|a| a as &dyn AnimationStateSource)
    }
}
