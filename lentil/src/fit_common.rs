use lentil::common_io::{mkdir, open_buf_writer};
use lentil::corpus::{Corpus, LoadSummary};
use lentil::hyper::Hyperparameters;
use lentil::lexicon::Vocabulary;
use lentil::sampler::{GibbsSampler, RunSummary, SamplerOptions};
use lentil::snapshot::{BackgroundSink, DirectorySink, SnapshotSink};
use lentil::StateSpace;

use clap::Args;
use log::{info, warn};
use serde::Serialize;
use std::io::Write;

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    #[arg(
        required = true,
        help = "Corpus file (plain or .gz)",
        long_help = "Corpus file, plain text or gzipped.\n\
                     `@doc <name> [<rating>]` starts a document,\n\
                     `@entity <id>:<count> ...` lists the entities it mentions,\n\
                     every other line is one unit of `<word-id>[:<multiplicity>]`.\n\
                     Lines starting with `#` are ignored."
    )]
    pub corpus: Box<str>,

    #[arg(
        long,
        help = "Vocabulary file, one word per line",
        long_help = "Vocabulary file, one word per line; the line number (from 0)\n\
                     is the word id used in the corpus. Used to label output\n\
                     columns and to resolve words in the sentiment lexicon."
    )]
    pub vocab: Option<Box<str>>,

    #[arg(short, long, required = true, help = "Output directory")]
    pub out: Box<str>,

    #[arg(long, default_value_t = 1000, help = "Total number of Gibbs sweeps")]
    pub iterations: usize,

    #[arg(
        long,
        default_value_t = 200,
        help = "Sweeps before samples are collected"
    )]
    pub burn_in: usize,

    #[arg(
        long,
        default_value_t = 20,
        help = "Sweeps between collected samples",
        long_help = "Number of sweeps between two collected samples after burn-in.\n\
                     Samples are taken at iterations burn_in + lag, burn_in + 2 * lag, ..."
    )]
    pub lag: usize,

    #[arg(
        long,
        default_value_t = 0,
        help = "Stop after this many collected samples (0: no limit)"
    )]
    pub samples: usize,

    #[arg(
        long,
        default_value_t = 0,
        help = "Write a checkpoint every this many sweeps (0: never)"
    )]
    pub checkpoint_interval: usize,

    #[arg(long, default_value_t = 42, help = "Random seed")]
    pub seed: u64,

    #[arg(long, default_value_t = 0.1, help = "Document-topic Dirichlet prior")]
    pub alpha: f64,

    #[arg(
        long,
        default_value_t = 0.01,
        help = "Topic-word Dirichlet prior (words outside the lexicon)"
    )]
    pub beta: f64,

    #[arg(long, default_value_t = false, help = "Skip count-table checks at checkpoints")]
    pub no_verify: bool,

    #[arg(long, short, help = "Hide the progress bar")]
    pub quiet: bool,

    #[arg(long, short, help = "Verbosity")]
    pub verbose: bool,
}

impl CommonArgs {
    pub fn init_logger(&self) {
        if self.verbose {
            std::env::set_var("RUST_LOG", "info");
        }
        let _ = env_logger::try_init();
    }

    pub fn sampler_options(&self) -> SamplerOptions {
        SamplerOptions {
            num_iterations: self.iterations,
            burn_in: self.burn_in,
            sample_lag: self.lag,
            num_samples: self.samples,
            checkpoint_interval: self.checkpoint_interval,
            seed: self.seed,
            verify_counts: !self.no_verify,
            show_progress: !self.quiet,
        }
    }

    /// Defaults with `alpha` and `beta` from the command line
    pub fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters {
            alpha: self.alpha,
            beta_common: self.beta,
            ..Default::default()
        }
    }

    pub fn read_vocabulary(&self) -> anyhow::Result<Option<Vocabulary>> {
        self.vocab
            .as_deref()
            .map(Vocabulary::read_file)
            .transpose()
    }

    /// Read the corpus and widen its vocabulary range to `vocab_size`
    pub fn read_corpus(&self, vocab_size: usize) -> anyhow::Result<(Corpus, LoadSummary)> {
        let (corpus, load) = Corpus::read_file(&self.corpus)?;
        anyhow::ensure!(corpus.num_units() > 0, "no units in {}", self.corpus);
        let vocab_size = vocab_size.max(corpus.vocab_size);
        Ok((corpus.with_vocab_size(vocab_size)?, load))
    }
}

#[derive(Serialize)]
struct RunRecord<'a> {
    model: &'static str,
    corpus: &'a str,
    load: LoadSummary,
    hyperparameters: Hyperparameters,
    seed: u64,
    summary: RunSummary,
}

/// Sample, writing snapshots under `{out}/` on a background thread,
/// and record the run in `{out}/run.json`.
pub fn run_and_write<M: StateSpace>(
    model: &M,
    corpus: &Corpus,
    vocab: Option<&Vocabulary>,
    load: LoadSummary,
    hyper: Hyperparameters,
    args: &CommonArgs,
) -> anyhow::Result<RunSummary> {
    mkdir(&args.out)?;

    let mut dir_sink = DirectorySink::new(&args.out)?;
    if let Some(vocab) = vocab {
        dir_sink = dir_sink.with_column_names("phi", vocab.words().to_vec());
    }
    let mut sink = BackgroundSink::spawn(dir_sink, 2);

    let mut sampler = GibbsSampler::new(model, corpus, args.sampler_options())?;
    let summary = match sampler.run(&mut sink) {
        Ok(summary) => summary,
        Err(e) => {
            // report the writer's own failure too, if any
            if let Err(w) = sink.finish() {
                warn!("snapshot writer: {}", w);
            }
            return Err(e);
        }
    };

    let record = RunRecord {
        model: model.name(),
        corpus: &args.corpus,
        load,
        hyperparameters: hyper,
        seed: args.seed,
        summary,
    };
    let mut json = open_buf_writer(&format!("{}/run.json", args.out))?;
    serde_json::to_writer_pretty(&mut json, &record)?;
    writeln!(json)?;
    json.flush()?;

    info!(
        "final log-likelihood {:.4} after {} sweeps",
        summary.log_likelihood, summary.iterations
    );
    Ok(summary)
}
