//! Synthetic observation streams for exercising the clustering engine.
//!
//! A fixed set of identities each get a random base direction. Visits emit a
//! burst of noisy copies of the visiting identity's direction at a regular
//! pace, followed by an idle gap, mimicking someone walking in front of a
//! camera and leaving again.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::links::Timestamp;

/// One line of a replayable stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub vector: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Ground-truth identity, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<usize>,
}

impl StreamEvent {
    pub fn new(vector: Vec<f32>, timestamp: Option<Timestamp>) -> Self {
        Self {
            vector,
            timestamp,
            identity: None,
        }
    }
}

/// Generates visits of random identities.
#[derive(Debug, Clone)]
pub struct StreamGenerator {
    rng: StdRng,
    identities: Vec<Vec<f32>>,
    noise: f32,
    step: f64,
    idle_gap: f64,
    visit_length: usize,
    clock: Timestamp,
}

impl StreamGenerator {
    pub const DEFAULT_NOISE: f32 = 0.05;
    pub const DEFAULT_STEP: f64 = 1.0;
    pub const DEFAULT_IDLE_GAP: f64 = 120.0;
    pub const DEFAULT_VISIT_LENGTH: usize = 5;

    /// Generator seeded from the operating system.
    pub fn new(identities: usize, dimension: usize) -> Self {
        Self::with_rng(StdRng::from_os_rng(), identities, dimension)
    }

    /// Reproducible generator.
    pub fn seeded(identities: usize, dimension: usize, seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), identities, dimension)
    }

    fn with_rng(mut rng: StdRng, identities: usize, dimension: usize) -> Self {
        let identities = (0..identities)
            .map(|_| random_direction(&mut rng, dimension))
            .collect();

        Self {
            rng,
            identities,
            noise: Self::DEFAULT_NOISE,
            step: Self::DEFAULT_STEP,
            idle_gap: Self::DEFAULT_IDLE_GAP,
            visit_length: Self::DEFAULT_VISIT_LENGTH,
            clock: 0.0,
        }
    }

    /// Per-component amplitude of the uniform noise added to each observation.
    pub fn with_noise(mut self, noise: f32) -> Self {
        self.noise = noise.abs();
        self
    }

    /// Time between observations inside one visit.
    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step.max(0.0);
        self
    }

    /// Quiet time after each visit. Keep it above the conversation threshold
    /// for visits to show up as separate conversations.
    pub fn with_idle_gap(mut self, idle_gap: f64) -> Self {
        self.idle_gap = idle_gap.max(0.0);
        self
    }

    pub fn with_visit_length(mut self, visit_length: usize) -> Self {
        self.visit_length = visit_length.max(1);
        self
    }

    pub fn identity_count(&self) -> usize {
        self.identities.len()
    }

    pub fn base_direction(&self, identity: usize) -> Option<&[f32]> {
        self.identities.get(identity).map(Vec::as_slice)
    }

    /// Timestamp the next observation will carry.
    pub fn clock(&self) -> Timestamp {
        self.clock
    }

    /// Emit one visit of `identity`; `None` if there is no such identity.
    pub fn visit(&mut self, identity: usize) -> Option<Vec<StreamEvent>> {
        let base = self.identities.get(identity)?.clone();

        let mut events = Vec::with_capacity(self.visit_length);
        for i in 0..self.visit_length {
            if i > 0 {
                self.clock += self.step;
            }
            let vector = base
                .iter()
                .map(|&component| component + self.jitter())
                .collect();
            events.push(StreamEvent {
                vector,
                timestamp: Some(self.clock),
                identity: Some(identity),
            });
        }
        self.clock += self.idle_gap;

        Some(events)
    }

    /// Emit `visits` visits by identities picked uniformly at random.
    pub fn generate(&mut self, visits: usize) -> Vec<StreamEvent> {
        if self.identities.is_empty() {
            return Vec::new();
        }

        let mut events = Vec::with_capacity(visits * self.visit_length);
        for _ in 0..visits {
            let identity = self.rng.random_range(0..self.identities.len());
            events.extend(self.visit(identity).unwrap_or_default());
        }
        events
    }

    fn jitter(&mut self) -> f32 {
        if self.noise == 0.0 {
            return 0.0;
        }
        self.rng.random_range(-self.noise..=self.noise)
    }
}

/// Unit vector with uniformly drawn components.
fn random_direction(rng: &mut StdRng, dimension: usize) -> Vec<f32> {
    loop {
        let vector: Vec<f32> = (0..dimension).map(|_| rng.random_range(-1.0..=1.0)).collect();
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON || dimension == 0 {
            return vector.into_iter().map(|x| x / norm.max(f32::EPSILON)).collect();
        }
    }
}
