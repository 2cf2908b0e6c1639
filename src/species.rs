//! Speciation: clustering genomes by compatibility distance.
//!
//! Species persist across generations. Each keeps a representative genome
//! fixed for the whole speciation pass; genomes join the first species (in
//! creation order) whose representative is closer than the current threshold.
//! The threshold itself is steered toward a target species count.
//!
//! Members are stored as indices into the population's genome vector of the
//! generation being speciated.

use std::cmp::Ordering;

use tracing::debug;

use crate::config::NeatConfig;
use crate::genome::Genome;

/// A cluster of structurally similar genomes.
#[derive(Debug, Clone)]
pub struct Species {
    id: usize,
    representative: Genome,
    members: Vec<usize>,
    age: usize,
    average_fitness: f32,
    offspring_quota: usize,
}

impl Species {
    fn new(id: usize, representative: Genome) -> Self {
        Self {
            id,
            representative,
            members: Vec::new(),
            age: 0,
            average_fitness: 0.0,
            offspring_quota: 0,
        }
    }

    /// Run-unique id, never reused after extinction.
    #[inline]
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Genome new members are compared against.
    #[inline]
    #[must_use]
    pub fn representative(&self) -> &Genome {
        &self.representative
    }

    /// Indices of the member genomes in the generation last speciated.
    ///
    /// Empty once that generation has been replaced by its offspring.
    #[inline]
    #[must_use]
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    /// Number of members.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the species has no members.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Generations this species has survived.
    #[inline]
    #[must_use]
    pub fn age(&self) -> usize {
        self.age
    }

    /// Mean member fitness, as of the last [`SpeciesSet::assign_quotas`].
    #[inline]
    #[must_use]
    pub fn average_fitness(&self) -> f32 {
        self.average_fitness
    }

    /// Offspring this species produces next generation, elite included.
    #[inline]
    #[must_use]
    pub fn offspring_quota(&self) -> usize {
        self.offspring_quota
    }

    /// Member indices sorted by descending fitness. Ties keep population order.
    #[must_use]
    pub fn ranked_members(&self, genomes: &[Genome]) -> Vec<usize> {
        let mut ranked = self.members.clone();
        ranked.sort_by(|&a, &b| {
            genomes[b]
                .fitness
                .partial_cmp(&genomes[a].fitness)
                .unwrap_or(Ordering::Equal)
        });
        ranked
    }

    /// Best members eligible as parents: `ceil(len * fraction)`, at least one.
    #[must_use]
    pub fn parent_pool(&self, genomes: &[Genome], fraction: f32) -> Vec<usize> {
        let mut ranked = self.ranked_members(genomes);
        let keep = ((ranked.len() as f32 * fraction).ceil() as usize).clamp(1, ranked.len().max(1));
        ranked.truncate(keep);
        ranked
    }

    fn compute_average(&mut self, genomes: &[Genome]) {
        self.average_fitness = if self.members.is_empty() {
            0.0
        } else {
            let total: f32 = self.members.iter().map(|&i| genomes[i].fitness).sum();
            total / self.members.len() as f32
        };
    }
}

/// All species of a run plus the adaptive compatibility threshold.
#[derive(Debug, Clone)]
pub struct SpeciesSet {
    species: Vec<Species>,
    threshold: f32,
    target_count: usize,
    adjust_step: f32,
    c3: f32,
    next_id: usize,
}

impl SpeciesSet {
    /// Create an empty set starting at `config.compatibility_threshold`.
    #[must_use]
    pub fn new(config: &NeatConfig) -> Self {
        Self {
            species: Vec::new(),
            threshold: config.compatibility_threshold,
            target_count: config.target_species_count,
            adjust_step: config.threshold_adjust_step,
            c3: config.c3,
            next_id: 0,
        }
    }

    /// Living species in creation order.
    #[inline]
    #[must_use]
    pub fn species(&self) -> &[Species] {
        &self.species
    }

    /// Number of living species.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.species.len()
    }

    /// Whether no species is alive.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    /// Current compatibility threshold.
    #[inline]
    #[must_use]
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Assign every genome to a species, then adapt the threshold.
    ///
    /// Existing species keep their representatives and lose their members.
    /// Species left empty are dropped; survivors take their first member as
    /// representative for the next pass.
    pub fn speciate(&mut self, genomes: &[Genome]) {
        for species in &mut self.species {
            species.members.clear();
        }
        if self.species.is_empty() {
            if let Some(first) = genomes.first() {
                self.found(first.clone());
            }
        }

        for (index, genome) in genomes.iter().enumerate() {
            let home = self.species.iter().position(|species| {
                genome.compatibility_distance(&species.representative, self.c3) < self.threshold
            });
            match home {
                Some(position) => self.species[position].members.push(index),
                None => {
                    let species = self.found(genome.clone());
                    species.members.push(index);
                }
            }
        }

        self.species.retain(|species| {
            if species.is_empty() {
                debug!(species = species.id, age = species.age, "species went extinct");
            }
            !species.is_empty()
        });
        for species in &mut self.species {
            species.representative = genomes[species.members[0]].clone();
            species.age += 1;
        }

        self.adjust_threshold();
    }

    /// Forget all member indices while keeping species and representatives.
    ///
    /// Called once the speciated generation is replaced, so no index outlives
    /// the genome vector it points into.
    pub fn clear_members(&mut self) {
        for species in &mut self.species {
            species.members.clear();
        }
    }

    fn found(&mut self, representative: Genome) -> &mut Species {
        let id = self.next_id;
        self.next_id += 1;
        debug!(species = id, "new species");
        self.species.push(Species::new(id, representative));
        let last = self.species.len() - 1;
        &mut self.species[last]
    }

    /// Move the threshold one step toward the target species count.
    ///
    /// Too many species raise it, too few lower it, never below one step.
    pub fn adjust_threshold(&mut self) {
        let count = self.species.len();
        let previous = self.threshold;
        match count.cmp(&self.target_count) {
            Ordering::Greater => self.threshold += self.adjust_step,
            Ordering::Less => {
                self.threshold = (self.threshold - self.adjust_step).max(self.adjust_step);
            }
            Ordering::Equal => return,
        }
        if self.threshold != previous {
            debug!(
                species = count,
                target = self.target_count,
                threshold = self.threshold,
                "compatibility threshold adjusted"
            );
        }
    }

    /// Compute average fitness and offspring quotas, then drop species with no quota.
    ///
    /// Each species receives `floor(share * population_size)` offspring, where
    /// `share` is its average fitness over the sum of all species averages
    /// (averages shifted to be non-negative first; an even split when the sum
    /// is zero). Slots lost to flooring go to the species with the highest
    /// average, so the quotas always add up to `population_size`.
    pub fn assign_quotas(&mut self, genomes: &[Genome], population_size: usize) {
        if self.species.is_empty() {
            return;
        }
        for species in &mut self.species {
            species.compute_average(genomes);
        }

        let lowest = self
            .species
            .iter()
            .map(|s| s.average_fitness)
            .fold(f32::INFINITY, f32::min);
        let shift = if lowest < 0.0 { -lowest } else { 0.0 };
        let total: f32 = self
            .species
            .iter()
            .map(|s| s.average_fitness + shift)
            .sum();

        let count = self.species.len();
        for species in &mut self.species {
            species.offspring_quota = if total > 0.0 && total.is_finite() {
                let share = (species.average_fitness + shift) / total;
                (share * population_size as f32).floor() as usize
            } else {
                population_size / count
            };
        }

        let best = self
            .species
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| {
                a.average_fitness
                    .partial_cmp(&b.average_fitness)
                    .unwrap_or(Ordering::Equal)
                    .then(ib.cmp(ia))
            })
            .map_or(0, |(index, _)| index);
        let assigned: usize = self.species.iter().map(|s| s.offspring_quota).sum();
        let best_quota = &mut self.species[best].offspring_quota;
        if assigned < population_size {
            *best_quota += population_size - assigned;
        } else {
            *best_quota = best_quota.saturating_sub(assigned - population_size);
        }

        self.species.retain(|species| {
            if species.offspring_quota == 0 {
                debug!(
                    species = species.id,
                    average_fitness = species.average_fitness,
                    "species pruned: no offspring quota"
                );
            }
            species.offspring_quota > 0
        });
    }
}
