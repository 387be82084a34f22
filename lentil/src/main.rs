mod fit_common;
mod fit_entity;
mod fit_jst;
mod fit_lda;

use clap::{Parser, Subcommand};
use fit_entity::*;
use fit_jst::*;
use fit_lda::*;
use log::info;

/// LENTIL
#[derive(Parser, Debug)]
#[command(
    version,
    about = "LENTIL",
    long_about = "Latent ENtity, Topic and sentIment Lexicon models\n\n\
                  Fits topic models to a tokenized corpus by collapsed Gibbs sampling.\n\
                  Units (sentences, or single tokens for plain LDA) carry one latent\n\
                  state each; estimates are collected after burn-in and averaged.\n\n\
                  Outputs go to {out}/iter-NNNNNN/ at checkpoints and collected\n\
                  samples, and to {out}/final/ at the end.",
    term_width = 80
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Latent Dirichlet allocation",
        long_about = "Latent Dirichlet allocation over tokens (or sentence units).\n\n\
                      Outputs:\n\
                      - phi.tsv.gz: topic x word probabilities\n\
                      - theta.tsv.gz: document x topic probabilities\n\
                      - assignments.tsv.gz: topic per unit\n\
                      - summary.json: iteration, samples, log-likelihood"
    )]
    Lda(LdaArgs),

    #[command(
        about = "Joint sentiment-topic model over sentences",
        long_about = "Joint sentiment-topic model: each sentence draws one sentiment\n\
                      and one topic. A sentiment lexicon restricts sentences whose\n\
                      lexicon words agree on a sentiment, and leaves out sentences\n\
                      whose lexicon words disagree.\n\n\
                      Outputs:\n\
                      - phi.tsv.gz: (sentiment, topic) x word probabilities\n\
                      - theta.tsv.gz: (document, sentiment) x topic probabilities\n\
                      - pi.tsv.gz: document x sentiment probabilities\n\
                      - assignments.tsv.gz: topic and sentiment per unit\n\
                      - summary.json: iteration, samples, log-likelihood, exclusions"
    )]
    Jst(JstArgs),

    #[command(
        about = "Entity-augmented topic model",
        long_about = "Topic model where each sentence is explained by its document's\n\
                      topics or by the topics of an entity the document mentions,\n\
                      each entity weighted by its number of mentions.\n\n\
                      Outputs:\n\
                      - phi.tsv.gz: topic x word probabilities\n\
                      - theta.tsv.gz: document x topic probabilities\n\
                      - entity_theta.tsv.gz: entity x topic probabilities\n\
                      - pi.tsv.gz: document x {document, entity} probabilities\n\
                      - assignments.tsv.gz: topic and entity per unit"
    )]
    Entity(EntityArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.commands {
        Commands::Lda(args) => {
            fit_lda(args)?;
        }
        Commands::Jst(args) => {
            fit_jst(args)?;
        }
        Commands::Entity(args) => {
            fit_entity(args)?;
        }
    }

    info!("Done");
    Ok(())
}
