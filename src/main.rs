use std::io::Write;

use clap::Parser;
use sales_agent::cli::CliArgs;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    sales_agent::logging::init_logging();
    let code = match sales_agent::run(args).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {err:?}");
            1
        }
    };

    // An interrupted prompt leaves a blocking stdin read that runtime shutdown would wait on.
    let _ = std::io::stdout().flush();
    std::process::exit(code);
}
