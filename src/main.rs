//! docarrow - MongoDB to Arrow export
//!
//! Converts the documents matching a filter into a typed columnar table using
//! a sequential, multithreaded or multiprocess strategy.
//!
//! # Usage
//!
//! ```bash
//! # Export a collection and write an Arrow IPC file
//! docarrow export --db shop --collection orders \
//!     --schema "id:int64, items:list<int64>" --strategy multiprocess -w 4 -o orders.arrow
//!
//! # Check two strategies produce the same table
//! docarrow compare --dump-file orders.bson --schema "id:int64" --candidate multithreaded
//! ```

use docarrow::cli::CliInterface;
use docarrow::error::Result;

/// Application entry point
#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Parse arguments, initialize logging and dispatch the subcommand
async fn run() -> Result<bool> {
    let cli = CliInterface::new()?;
    initialize_logging(&cli);
    cli.run().await
}

/// Initialize logging system based on configuration and verbosity flags
///
/// Logs always go to stderr: a worker's stdout carries its reply.
fn initialize_logging(cli: &CliInterface) {
    let logging = &cli.config().logging;
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(logging.level.to_tracing_level())
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
