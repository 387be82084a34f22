use crate::fit_common::*;

use clap::Args;
use lentil::lexicon::SentimentLexicon;
use lentil::models::Lda;
use log::info;

#[derive(Args, Debug, Clone)]
pub struct LdaArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(short = 'k', long, default_value_t = 10, help = "Number of topics")]
    pub topics: usize,

    #[arg(
        long,
        default_value_t = false,
        help = "Sample one topic per unit instead of per token",
        long_help = "By default every token is its own unit (standard LDA).\n\
                     With this flag each corpus line keeps a single topic shared by\n\
                     all of its tokens (sentence LDA)."
    )]
    pub sentence_units: bool,

    #[arg(
        long,
        default_value_t = 0,
        help = "Leave out sentence units longer than this (0: no limit)"
    )]
    pub max_unit_length: usize,
}

pub fn fit_lda(args: &LdaArgs) -> anyhow::Result<()> {
    let c = &args.common;
    c.init_logger();

    let vocab = c.read_vocabulary()?;
    let (corpus, load) = c.read_corpus(vocab.as_ref().map(|v| v.len()).unwrap_or(0))?;

    let mut corpus = if args.sentence_units {
        corpus
    } else {
        info!("splitting {} units into tokens", corpus.num_units());
        corpus.tokenwise()
    };

    let hyper = lentil::Hyperparameters {
        max_unit_length: args.max_unit_length,
        ..c.hyperparameters()
    };
    corpus.annotate(&SentimentLexicon::empty(), hyper.max_unit_length);

    let model = Lda::new(args.topics, &hyper, corpus.vocab_size)?;
    run_and_write(&model, &corpus, vocab.as_ref(), load, hyper, c)?;
    Ok(())
}
