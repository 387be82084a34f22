//! Collapsed Gibbs sampling loop, generic over the model's state space.
//!
//! One sweep visits every unit in corpus order and, for each unit that
//! takes part in sampling, removes its current state from the counts,
//! evaluates the conditional over all candidate states, draws a new
//! state and adds it back. The loop is strictly sequential and draws
//! from a single seeded generator.

use crate::conditional::{LatentState, StateSpace};
use crate::corpus::{Corpus, ExclusionSummary};
use crate::count_store::{CountOp, CountStore};
use crate::estimate::Estimates;
use crate::snapshot::{AssignmentRow, Snapshot, SnapshotSink, SnapshotSummary};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info};
use mcmc_util::{sample_categorical_log, McmcChain};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SamplerOptions {
    /// Total number of sweeps. Default: 1000
    pub num_iterations: usize,
    /// Sweeps before any sample is collected. Default: 200
    pub burn_in: usize,
    /// Sweeps between collected samples. Default: 20
    pub sample_lag: usize,
    /// Stop after this many collected samples (0: no limit). Default: 0
    pub num_samples: usize,
    /// Write a snapshot every this many sweeps (0: never). Default: 0
    pub checkpoint_interval: usize,
    /// Random seed. Default: 42
    pub seed: u64,
    /// Recount and compare all tables at every collect/checkpoint. Default: true
    pub verify_counts: bool,
    /// Draw a progress bar. Default: true
    pub show_progress: bool,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        SamplerOptions {
            num_iterations: 1000,
            burn_in: 200,
            sample_lag: 20,
            num_samples: 0,
            checkpoint_interval: 0,
            seed: 42,
            verify_counts: true,
            show_progress: true,
        }
    }
}

impl SamplerOptions {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.sample_lag > 0, "sample lag must be at least 1");
        anyhow::ensure!(self.num_iterations > 0, "need at least one iteration");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Initializing,
    BurningIn,
    Sampling,
    Collecting,
    Terminated,
}

/// Why a run ended; all of these are normal terminations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Termination {
    IterationBudget,
    SampleBudget,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunSummary {
    pub iterations: usize,
    pub num_samples: usize,
    pub termination: Termination,
    pub log_likelihood: f64,
}

pub struct GibbsSampler<'a, M: StateSpace> {
    model: &'a M,
    corpus: &'a Corpus,
    counts: CountStore,
    /// per document, per unit; `None` for units left out of sampling
    assignments: Vec<Vec<Option<usize>>>,
    rng: SmallRng,
    /// Scratch space for per-state log-weights
    log_weights: Vec<f64>,
    /// Scratch space for per-state weights
    weights: Vec<f64>,
    phase: Phase,
    iteration: usize,
    chain: McmcChain,
    options: SamplerOptions,
    exclusions: ExclusionSummary,
    stop: Arc<AtomicBool>,
}

impl<'a, M: StateSpace> GibbsSampler<'a, M> {
    /// Assign every sampled unit a random first state and fill the counts.
    ///
    /// Excluded units (see [`Corpus::annotate`]) stay unassigned and
    /// never enter the counts.
    pub fn new(model: &'a M, corpus: &'a Corpus, options: SamplerOptions) -> anyhow::Result<Self> {
        options.validate()?;

        let mut rng = SmallRng::seed_from_u64(options.seed);
        let mut counts = model.empty_counts(corpus);
        let mut assignments = Vec::with_capacity(corpus.num_documents());

        for (d, doc) in corpus.documents.iter().enumerate() {
            let mut states = Vec::with_capacity(doc.units.len());
            for unit in doc.units.iter() {
                if unit.is_excluded() {
                    states.push(None);
                    continue;
                }
                for t in unit.tokens.iter() {
                    anyhow::ensure!(
                        t.id < counts.word_topic.ncols(),
                        "document {}: token id {} outside the vocabulary ({})",
                        doc.name,
                        t.id,
                        counts.word_topic.ncols()
                    );
                }
                let z = model.initial_state(doc, unit, &mut rng);
                model.update_counts(&mut counts, d, doc, unit, z, CountOp::Add);
                states.push(Some(z));
            }
            assignments.push(states);
        }

        let exclusions = corpus.exclusion_summary();
        info!(
            "{}: initialized {} units ({} fixed sentiment, {} excluded)",
            model.name(),
            exclusions.num_free + exclusions.num_fixed,
            exclusions.num_fixed,
            exclusions.num_ambiguous + exclusions.num_too_long
        );

        Ok(GibbsSampler {
            model,
            corpus,
            counts,
            assignments,
            rng,
            log_weights: vec![],
            weights: vec![],
            phase: Phase::Initializing,
            iteration: 0,
            chain: McmcChain::new(),
            options,
            exclusions,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Shared flag; setting it ends [`GibbsSampler::run`] at the next
    /// sweep boundary.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn counts(&self) -> &CountStore {
        &self.counts
    }

    pub fn assignments(&self) -> &[Vec<Option<usize>>] {
        &self.assignments
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn num_samples(&self) -> usize {
        self.chain.n_samples()
    }

    pub fn exclusions(&self) -> ExclusionSummary {
        self.exclusions
    }

    /// Decoded state of unit `u` in document `d`
    pub fn latent_state(&self, d: usize, u: usize) -> Option<LatentState> {
        let z = (*self.assignments.get(d)?.get(u)?)?;
        Some(self.model.decode(&self.corpus.documents[d], z))
    }

    /// One full pass over all units.
    ///
    /// Returns the number of units whose state changed. An empty
    /// support for any unit aborts the sweep with an error; the unit's
    /// previous state is put back first so the counts stay consistent.
    pub fn sweep(&mut self) -> anyhow::Result<usize> {
        let model = self.model;
        let corpus = self.corpus;
        let mut num_moves = 0;

        for (d, doc) in corpus.documents.iter().enumerate() {
            for (u, unit) in doc.units.iter().enumerate() {
                let Some(old_z) = self.assignments[d][u] else {
                    continue;
                };

                model.update_counts(&mut self.counts, d, doc, unit, old_z, CountOp::Remove);
                model.log_weights(&self.counts, d, doc, unit, &mut self.log_weights);

                let new_z = match sample_categorical_log(
                    &self.log_weights,
                    &mut self.weights,
                    &mut self.rng,
                ) {
                    Ok(z) => z,
                    Err(e) => {
                        model.update_counts(&mut self.counts, d, doc, unit, old_z, CountOp::Add);
                        return Err(anyhow::anyhow!(
                            "document {} unit {}: {}",
                            doc.name,
                            u,
                            e
                        ));
                    }
                };

                model.update_counts(&mut self.counts, d, doc, unit, new_z, CountOp::Add);
                self.assignments[d][u] = Some(new_z);

                if new_z != old_z {
                    num_moves += 1;
                }
            }
        }
        Ok(num_moves)
    }

    /// Rebuild all count tables from the current assignments
    pub fn recompute_counts(&self) -> CountStore {
        let mut counts = self.model.empty_counts(self.corpus);
        for (d, doc) in self.corpus.documents.iter().enumerate() {
            for (unit, z) in doc.units.iter().zip(self.assignments[d].iter()) {
                if let Some(z) = *z {
                    self.model
                        .update_counts(&mut counts, d, doc, unit, z, CountOp::Add);
                }
            }
        }
        counts
    }

    /// Check cached row sums and compare every cell against a recount.
    pub fn verify_counts(&self) -> anyhow::Result<()> {
        self.counts.verify()?;
        let recount = self.recompute_counts();
        if let Some((name, r, c)) = recount.first_difference(&self.counts) {
            return Err(anyhow::anyhow!(
                "count table {} diverged from the assignments at ({}, {})",
                name,
                r,
                c
            ));
        }
        Ok(())
    }

    /// Estimates from the current counts
    pub fn estimate(&self) -> anyhow::Result<Estimates> {
        self.model.estimate(&self.counts, self.corpus)
    }

    pub fn log_likelihood(&self) -> f64 {
        self.model.log_likelihood(&self.counts)
    }

    /// Posterior mean over collected samples, or the current estimate
    /// when nothing was collected.
    pub fn final_estimate(&self) -> anyhow::Result<Estimates> {
        let mut est = self.estimate()?;
        if self.chain.n_samples() > 0 {
            est.replace_values(|name| self.chain.posterior_mean(name));
        }
        Ok(est)
    }

    fn snapshot(&self, label: String, estimates: Estimates, log_likelihood: f64) -> Snapshot {
        let mut assignments = vec![];
        for (d, doc) in self.corpus.documents.iter().enumerate() {
            for (u, z) in self.assignments[d].iter().enumerate() {
                assignments.push(AssignmentRow {
                    doc: doc.name.clone(),
                    unit: u,
                    state: z.map(|z| self.model.decode(doc, z)),
                });
            }
        }

        Snapshot {
            summary: SnapshotSummary {
                model: self.model.name(),
                label,
                iteration: self.iteration,
                phase: self.phase,
                num_samples: self.chain.n_samples(),
                posterior_mean: self.phase == Phase::Terminated && self.chain.n_samples() > 0,
                log_likelihood,
                exclusions: self.exclusions,
            },
            estimates,
            assignments,
        }
    }

    /// Run sweeps until the iteration budget, the sample budget or the
    /// stop flag ends the run, handing snapshots to `sink`.
    ///
    /// Samples are collected at iterations `burn_in + j * lag` (`j >= 1`);
    /// checkpoints are written every `checkpoint_interval` iterations.
    /// A final snapshot labelled `final` is always submitted.
    pub fn run(&mut self, sink: &mut dyn SnapshotSink) -> anyhow::Result<RunSummary> {
        let opts = self.options.clone();

        let pb = ProgressBar::new(opts.num_iterations as u64);
        pb.set_style(ProgressStyle::with_template(
            "Gibbs {bar:40} {pos}/{len} sweeps ({eta}) {msg}",
        )?);
        if !opts.show_progress {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }

        let mut termination = Termination::IterationBudget;

        while self.iteration < opts.num_iterations {
            if self.stop.load(Ordering::Relaxed) {
                info!("stop requested after {} sweeps", self.iteration);
                termination = Termination::Stopped;
                break;
            }

            let it = self.iteration + 1;
            self.phase = if it <= opts.burn_in {
                Phase::BurningIn
            } else {
                Phase::Sampling
            };

            let num_moves = self.sweep()?;
            self.iteration = it;
            pb.inc(1);
            debug!("sweep {}: {} units moved", it, num_moves);

            let collect = it > opts.burn_in && (it - opts.burn_in) % opts.sample_lag == 0;
            let checkpoint = opts.checkpoint_interval > 0 && it % opts.checkpoint_interval == 0;

            if !(collect || checkpoint) {
                continue;
            }

            if opts.verify_counts {
                self.verify_counts()?;
            }

            let estimates = self.estimate()?;
            let llik = self.log_likelihood();
            pb.set_message(format!("llik {:.2}", llik));

            if collect {
                self.phase = Phase::Collecting;
                self.chain.push_sample(
                    estimates
                        .tables
                        .iter()
                        .map(|t| (t.name, &t.values)),
                )?;
                info!(
                    "iteration {}: collected sample {} (log-likelihood {:.4})",
                    it,
                    self.chain.n_samples(),
                    llik
                );
            } else {
                info!("iteration {}: checkpoint (log-likelihood {:.4})", it, llik);
            }

            sink.submit(self.snapshot(format!("iter-{:06}", it), estimates, llik))?;

            if collect && opts.num_samples > 0 && self.chain.n_samples() >= opts.num_samples {
                termination = Termination::SampleBudget;
                break;
            }
        }
        pb.finish_and_clear();

        self.phase = Phase::Terminated;

        if opts.verify_counts {
            self.verify_counts()?;
        }

        let llik = self.log_likelihood();
        let estimates = self.final_estimate()?;
        sink.submit(self.snapshot("final".to_string(), estimates, llik))?;
        sink.finish()?;

        info!(
            "{}: finished after {} sweeps, {} samples ({:?})",
            self.model.name(),
            self.iteration,
            self.chain.n_samples(),
            termination
        );

        Ok(RunSummary {
            iterations: self.iteration,
            num_samples: self.chain.n_samples(),
            termination,
            log_likelihood: llik,
        })
    }
}
