use crate::fit_common::*;

use clap::Args;
use lentil::lexicon::SentimentLexicon;
use lentil::models::JointSentimentTopic;
use log::info;

#[derive(Args, Debug, Clone)]
pub struct JstArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(short = 'k', long, default_value_t = 10, help = "Number of topics per sentiment")]
    pub topics: usize,

    #[arg(short = 's', long, default_value_t = 2, help = "Number of sentiment classes")]
    pub sentiments: usize,

    #[arg(
        long,
        help = "Sentiment lexicon: `<word> <sentiment>` per line",
        long_help = "Sentiment lexicon, one `<word> <sentiment-index>` pair per line.\n\
                     Words are looked up in --vocab when given, otherwise they must\n\
                     be word ids. A word listed under two sentiments is ignored.\n\
                     A unit whose lexicon words all share one sentiment is sampled\n\
                     only under that sentiment; a unit mixing two sentiments is left\n\
                     out of sampling."
    )]
    pub lexicon: Option<Box<str>>,

    #[arg(
        long,
        default_value_t = 0.01,
        help = "Topic-word prior of a lexicon word under its own sentiment (> 0)"
    )]
    pub beta_lexicon: f64,

    #[arg(
        long,
        default_value_t = 0.0,
        help = "Topic-word prior of a lexicon word under other sentiments"
    )]
    pub beta_other_lexicon: f64,

    #[arg(long, default_value_t = 1.0, help = "Document-sentiment Dirichlet prior")]
    pub gamma: f64,

    #[arg(
        long,
        default_value_t = 50,
        help = "Leave out units longer than this (0: no limit)"
    )]
    pub max_unit_length: usize,
}

pub fn fit_jst(args: &JstArgs) -> anyhow::Result<()> {
    let c = &args.common;
    c.init_logger();

    let vocab = c.read_vocabulary()?;

    let lexicon = match args.lexicon.as_deref() {
        Some(file) => SentimentLexicon::read_file(file, vocab.as_ref())?,
        None => {
            info!("no lexicon given; every unit samples its sentiment freely");
            SentimentLexicon::empty()
        }
    };

    let vocab_size = vocab
        .as_ref()
        .map(|v| v.len())
        .unwrap_or(0)
        .max(lexicon.id_range());
    let (mut corpus, load) = c.read_corpus(vocab_size)?;

    let hyper = lentil::Hyperparameters {
        beta_lexicon: args.beta_lexicon,
        beta_other_lexicon: args.beta_other_lexicon,
        gamma: args.gamma,
        max_unit_length: args.max_unit_length,
        ..c.hyperparameters()
    };

    let model = JointSentimentTopic::new(
        args.topics,
        args.sentiments,
        &hyper,
        &lexicon,
        corpus.vocab_size,
    )?;

    let exclusions = corpus.annotate(&lexicon, hyper.max_unit_length);
    info!(
        "{} free units, {} with a fixed sentiment",
        exclusions.num_free, exclusions.num_fixed
    );

    run_and_write(&model, &corpus, vocab.as_ref(), load, hyper, c)?;
    Ok(())
}
