use clap::Parser;
use tagsmith_trainer::{run_training, Args, TrainConfig};
use tracing::{error, info, Level};

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    match run_training(TrainConfig::from(args)) {
        Ok(report) => {
            info!(
                epochs = report.epochs_run,
                early_stopped = report.early_stopped,
                best_token_f1 = report.best.as_ref().map(|b| b.token_f1),
                best_chunk_f1 = report.best.as_ref().map(|b| b.chunk_f1),
                "training finished"
            );
        }
        Err(e) => {
            error!("training failed: {e:#}");
            std::process::exit(1);
        }
    }
}
