use crate::fit_common::*;

use clap::Args;
use lentil::lexicon::SentimentLexicon;
use lentil::models::EntityTopicModel;
use log::warn;

#[derive(Args, Debug, Clone)]
pub struct EntityArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(short = 'k', long, default_value_t = 10, help = "Number of topics")]
    pub topics: usize,

    #[arg(
        long,
        default_value_t = 0,
        help = "Number of entities (0: 1 + largest entity id in the corpus)"
    )]
    pub entities: usize,

    #[arg(
        long,
        default_value_t = 1.0,
        help = "Document-vs-entity switch Dirichlet prior"
    )]
    pub gamma: f64,

    #[arg(
        long,
        default_value_t = 50,
        help = "Leave out units longer than this (0: no limit)"
    )]
    pub max_unit_length: usize,
}

pub fn fit_entity(args: &EntityArgs) -> anyhow::Result<()> {
    let c = &args.common;
    c.init_logger();

    let vocab = c.read_vocabulary()?;
    let (corpus, load) = c.read_corpus(vocab.as_ref().map(|v| v.len()).unwrap_or(0))?;

    let num_entities = args.entities.max(corpus.num_entities);
    let mut corpus = corpus.with_num_entities(num_entities)?;
    if corpus.num_entities == 0 {
        warn!("no @entity lines in {}; fitting document topics only", c.corpus);
    }

    let hyper = lentil::Hyperparameters {
        gamma: args.gamma,
        max_unit_length: args.max_unit_length,
        ..c.hyperparameters()
    };
    corpus.annotate(&SentimentLexicon::empty(), hyper.max_unit_length);

    let model = EntityTopicModel::new(args.topics, num_entities, &hyper, corpus.vocab_size)?;
    run_and_write(&model, &corpus, vocab.as_ref(), load, hyper, c)?;
    Ok(())
}
